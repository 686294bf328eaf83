use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub language: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectMember {
    pub project_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemberRole {
    Owner,
    Maintainer,
    Reviewer,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Maintainer => "MAINTAINER",
            Self::Reviewer => "REVIEWER",
        }
    }
}

impl FromStr for MemberRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OWNER" => Ok(Self::Owner),
            "MAINTAINER" => Ok(Self::Maintainer),
            "REVIEWER" => Ok(Self::Reviewer),
            _ => Err(AppError::Validation(
                "Role must be OWNER, MAINTAINER or REVIEWER".to_string(),
            )),
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    Javascript,
    Python,
    Java,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Javascript => "JAVASCRIPT",
            Self::Python => "PYTHON",
            Self::Java => "JAVA",
        }
    }
}

impl FromStr for Language {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JAVASCRIPT" => Ok(Self::Javascript),
            "PYTHON" => Ok(Self::Python),
            "JAVA" => Ok(Self::Java),
            other => Err(AppError::Validation(format!(
                "Unsupported language: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Version {
    pub id: String,
    pub project_id: String,
    pub author_id: String,
    pub language: String,
    pub content: String,
    pub created_at: String,
}

impl Version {
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VersionSummary {
    pub id: String,
    pub project_id: String,
    pub author_id: String,
    pub language: String,
    pub created_at: String,
}

/// Where a comment sits in its thread. Replies only hang off roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "parent_id", rename_all = "snake_case")]
pub enum Thread {
    Root,
    Reply(String),
}

impl Thread {
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Reply(parent_id) => Some(parent_id),
        }
    }
}

impl From<Option<String>> for Thread {
    fn from(parent_id: Option<String>) -> Self {
        parent_id.map_or(Self::Root, Self::Reply)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub version_id: String,
    pub line: i64,
    pub body: String,
    pub thread: Thread,
    pub created_at: String,
    pub author: Author,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reaction {
    pub id: String,
    pub comment_id: String,
    pub user_id: String,
    pub kind: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReactionCount {
    pub kind: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserStat {
    pub user_id: String,
    pub points: i64,
    pub comments_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityKind {
    Comment,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comment => "COMMENT",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewActivity {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub version_id: String,
    pub kind: String,
    pub points: i64,
    pub created_at: String,
}
