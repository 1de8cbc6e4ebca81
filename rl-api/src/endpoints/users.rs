//! User endpoints.

use rl_core::error::RlResult;
use rl_models::User;

use crate::client::ApiClient;
use crate::response::UsersBody;

impl ApiClient {
    /// List the users visible to the logged-in user.
    pub async fn list_users(&self) -> RlResult<Vec<User>> {
        let body: UsersBody = self.get_json("/users.list").await?;
        Ok(body.users)
    }
}
