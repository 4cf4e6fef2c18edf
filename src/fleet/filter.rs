use super::TargetRef;

/// Narrows a deployment run to some targets. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetFilter {
    /// Owner of the virtualenv.
    pub user: Option<String>,
    pub host: Option<String>,
    /// Full virtualenv path.
    pub path: Option<String>,
}

impl TargetFilter {
    pub fn matches(&self, t: &TargetRef<'_>) -> bool {
        let user_ok = self
            .user
            .as_deref()
            .is_none_or(|user| t.target.user.as_deref() == Some(user));
        let host_ok = self
            .host
            .as_deref()
            .is_none_or(|host| t.host.hostname == host);
        let path_ok = self
            .path
            .as_deref()
            .is_none_or(|path| t.target.path.as_os_str() == path);
        user_ok && host_ok && path_ok
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.host.is_none() && self.path.is_none()
    }
}
