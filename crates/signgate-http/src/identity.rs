//! The caller identity established by the preceding authentication stage.

use signgate_core::AppId;

/// Who is calling, as decided before the signature stage runs.
///
/// The signature stage never authenticates callers itself. It reads this
/// value from the request extensions; a request without one is treated as
/// anonymous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    application_id: Option<AppId>,
    anonymous: bool,
}

impl CallerIdentity {
    /// An anonymous caller. Anonymous requests are never signature-checked.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            application_id: None,
            anonymous: true,
        }
    }

    /// An authenticated caller, optionally bound to an application.
    #[must_use]
    pub fn authenticated(application_id: Option<AppId>) -> Self {
        Self {
            application_id,
            anonymous: false,
        }
    }

    /// Whether the caller passed authentication.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.anonymous
    }

    /// The application the caller acts for, if known.
    #[must_use]
    pub fn application_id(&self) -> Option<&AppId> {
        self.application_id.as_ref()
    }
}

impl Default for CallerIdentity {
    fn default() -> Self {
        Self::anonymous()
    }
}
