use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: String,
}

/// Whether joining a group is immediate or goes through an owner-approved request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupAccess {
    Public,
    Private,
}

impl GroupAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupAccess::Public => "public",
            GroupAccess::Private => "private",
        }
    }
}

impl fmt::Display for GroupAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(GroupAccess::Public),
            "private" => Ok(GroupAccess::Private),
            other => Err(format!(
                "Group access must be public or private, got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: String,
    pub group_name: String,
    pub category: String,
    pub description: String,
    pub location: Option<String>,
    pub group_access: GroupAccess,
    pub group_owner: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub group_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    pub group_id: String,
    pub group_name: Option<String>,
    pub creator: String,
    pub creator_username: Option<String>,
    pub post_title: String,
    pub post_message: String,
    pub event_button: bool,
    pub event_date: Option<String>,
    pub date_posted: String,
    pub edited_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub username: String,
    pub comment_text: String,
    pub date_posted: String,
    pub last_edited: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_access_parses_case_insensitively() {
        assert_eq!("Public".parse::<GroupAccess>().unwrap(), GroupAccess::Public);
        assert_eq!(" PRIVATE ".parse::<GroupAccess>().unwrap(), GroupAccess::Private);
        assert!("secret".parse::<GroupAccess>().is_err());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User {
            id: "u".into(),
            username: "alice".into(),
            email: "a@example.test".into(),
            first_name: "A".into(),
            last_name: "L".into(),
            password_hash: "$2b$secret".into(),
            is_admin: false,
            created_at: "now".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
    }
}
