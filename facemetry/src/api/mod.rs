//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for the three endpoints
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - **Camera** (`GET /camera/`, `POST /camera/`): client-facing capture and
//!   upload analysis, responses wrapped in a `{"success": true, "data": ...}`
//!   envelope
//! - **Recognize** (`POST /recognize/`): service-to-service analysis of a
//!   base64 image, flat response shape; only served when the analyzer runs
//!   in-process
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`;
//! the rendered documentation is available at `/docs`.

pub mod handlers;
pub mod models;
