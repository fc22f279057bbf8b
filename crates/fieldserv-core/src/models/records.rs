use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A record kind the API exposes under its own collection path.
pub trait Resource: Serialize + DeserializeOwned + Send + 'static {
    /// Collection path, e.g. `/tasks`
    const PATH: &'static str;

    /// Human-readable plural name for logs and CLI output
    const NAME: &'static str;

    /// Server-assigned id, absent before creation
    fn id(&self) -> Option<&str>;

    /// One-line summary for listings
    fn summary(&self) -> String;

    fn item_path(id: &str) -> String {
        format!("{}/{}", Self::PATH, id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Resource for Company {
    const PATH: &'static str = "/companies";
    const NAME: &'static str = "companies";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn summary(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Resource for Member {
    const PATH: &'static str = "/members";
    const NAME: &'static str = "members";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn summary(&self) -> String {
        match self.role {
            Some(ref role) => format!("{} ({}) {}", self.name, role, self.phone),
            None => format!("{} {}", self.name, self.phone),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Resource for Client {
    const PATH: &'static str = "/clients";
    const NAME: &'static str = "clients";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn summary(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Resource for Business {
    const PATH: &'static str = "/businesses";
    const NAME: &'static str = "businesses";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn summary(&self) -> String {
        match self.address {
            Some(ref address) => format!("{} - {}", self.name, address),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Open,
    InProgress,
    Done,
    Cancelled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource for Task {
    const PATH: &'static str = "/tasks";
    const NAME: &'static str = "tasks";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn summary(&self) -> String {
        let status = match self.status {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in progress",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Unknown => "?",
        };
        match self.due_date {
            Some(due) => format!("[{}] {} (due {})", status, self.title, due.format("%Y-%m-%d")),
            None => format!("[{}] {}", status, self.title),
        }
    }
}
