use crate::pb::HealthRes;

/// Simple health service that can be used by both gRPC and REST APIs
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    /// Returns a `HealthRes` indicating the service is healthy.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Ark is alive".into(),
        }
    }
}
