//! HTTP surface.
//!
//! - `GET /api/test/slow`: catalogue query through the blocking runner
//! - `GET /api/test/fast`: the same query through the non-blocking runner
//!
//! Both return a JSON array of `"<item> (<category>)"` strings. OpenAPI documentation is served at
//! `/api-docs/openapi.json` and rendered at `/docs`.

pub mod handlers;
