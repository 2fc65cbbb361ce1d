use crate::dto::HealthRes;

/// Simple health service shared by every HQM surface.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Static health check; does not require an instance.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "HQM is alive".into(),
        }
    }
}
