use gatehouse_core::UserId;

/// Caller identity for a request.
///
/// Inserted by the caller middleware; present for every protected route.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CallerContext {
    user_id: UserId,
}

impl CallerContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}
