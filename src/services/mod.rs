/// Fairness-constrained content assignment engine.
pub mod assignment;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Idempotent phase-transition coordinator.
pub mod phase_service;
/// Room read model and creator credential checks.
pub mod room_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor with degraded-mode handling.
pub mod storage_supervisor;
/// Creator-driven validation coordinator.
pub mod validation_service;
