use serde::Deserialize;
use serde::Serialize;

/// A user record as returned by the backend's `/user/auth/` endpoints.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_no: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

/// Registration payload for `POST /user/auth/`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_no: Option<String>,
}

/// Partial profile update for `PUT /user/auth/{id}/`. Only the populated
/// fields are sent; the server returns the full updated record, which
/// becomes the new local `user` wholesale.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_no: Option<String>,
}

#[derive(Serialize, Debug)]
pub(crate) struct TokenRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Token pair minted by `POST /token/`.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TokenResponse {
    pub access: String,
    pub refresh: String,
}

#[derive(Serialize, Debug)]
pub(crate) struct VerifyRequest<'a> {
    pub token: &'a str,
}

#[derive(Serialize, Debug)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Reply from `POST /token/refresh/`. The backend may rotate the refresh
/// token as well; when it does not, the stored one stays valid.
#[derive(Deserialize, Clone, Debug)]
pub(crate) struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// `GET /user/auth/` returns the caller's own record, or the full user list
/// when the caller is an admin.
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub(crate) enum UserListOrOne {
    Many(Vec<User>),
    One(User),
}

impl UserListOrOne {
    /// The record describing the caller: the object itself, or the first
    /// element of an admin's list reply.
    pub fn into_current(self) -> Option<User> {
        match self {
            UserListOrOne::One(user) => Some(user),
            UserListOrOne::Many(users) => users.into_iter().next(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Student).ok(), Some("\"student\"".to_string()));
        let role: Role = serde_json::from_str("\"admin\"").expect("role should parse");
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn current_user_from_single_object() {
        let reply: UserListOrOne = serde_json::from_str(
            r#"{"id":1,"username":"alice","email":"alice@x.com","role":"student"}"#,
        )
        .expect("object reply should parse");
        let user = reply.into_current().expect("user present");
        assert_eq!(user.username, "alice");
        assert_eq!(user.mobile_no, None);
    }

    #[test]
    fn current_user_from_admin_list_is_first_element() {
        let reply: UserListOrOne = serde_json::from_str(
            r#"[{"id":7,"username":"root","email":"root@x.com","role":"admin"},
                {"id":8,"username":"bob","email":"bob@x.com","role":"teacher"}]"#,
        )
        .expect("list reply should parse");
        let user = reply.into_current().expect("user present");
        assert_eq!(user.id, 7);
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn empty_admin_list_yields_no_current_user() {
        let reply: UserListOrOne = serde_json::from_str("[]").expect("empty list should parse");
        assert!(reply.into_current().is_none());
    }

    #[test]
    fn user_update_skips_unset_fields() {
        let patch = UserUpdate {
            email: Some("new@x.com".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&patch).ok(),
            Some(r#"{"email":"new@x.com"}"#.to_string())
        );
    }
}
