//! OpenAPI documentation for the test endpoints.

use utoipa::OpenApi;

use crate::api::handlers::comparison;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Blocking vs. non-blocking query API",
        description = "Two endpoints that run the same database query, one on a blocked worker and one with suspended waits."
    ),
    servers(
        (url = "/api", description = "Test endpoints")
    ),
    paths(comparison::get_slow, comparison::get_fast),
    tags(
        (name = "test", description = "Latency comparison endpoints")
    )
)]
pub struct ApiDoc;
