//! Client for a campus Student Information System REST API.
//!
//! Wraps an OAuth2 token lifecycle (password, refresh-token, and
//! authorization-code grants), a two-tier self-validating response cache,
//! and a pagination driver behind one [`SisClient`].  The HTTP layer and
//! token persistence are injected through the [`HttpTransport`] and
//! [`TokenStore`] traits so the whole client can run against scripted
//! fixtures in tests.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod token;
pub mod transport;
pub mod types;

pub use cache::{ResponseCache, LONG_TTL, SHORT_TTL};
pub use client::{SisClient, PAGE_LIMIT};
pub use config::SisConfig;
pub use error::{SisError, SisResult};
pub use token::{AccessToken, FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{
    reduce_enrollment_records, CourseEnrollment, EnrolmentStatus, SisCourse, Subject, Term,
};
