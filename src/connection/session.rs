use std::sync::RwLock;

/// Authenticated session state shared by every request.
///
/// The backend keeps the session in a cookie; the bearer token is the value
/// mutation requests send in their `Authorization` header.
#[derive(Debug, Default)]
pub struct Session {
    token: RwLock<Option<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        let session = Self::new();
        session.set_token(token);
        session
    }

    pub fn set_token(&self, token: &str) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(token.to_string());
    }

    pub fn clear(&self) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// `Authorization` header value for the current token, if any.
    pub fn bearer(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|token| format!("Bearer {}", token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let session = Session::new();
        assert!(!session.is_authenticated());
        assert_eq!(session.bearer(), None);

        session.set_token("abc");
        assert!(session.is_authenticated());
        assert_eq!(session.bearer().as_deref(), Some("Bearer abc"));

        session.clear();
        assert!(!session.is_authenticated());
    }
}
