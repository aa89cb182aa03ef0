//! Request and response types for the chat pipeline.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::document::SourceCitation;

/// The persona the user identifies as. Drives the role line of the prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    /// A worker on a construction site.
    #[serde(rename = "Construction Worker")]
    ConstructionWorker,
    /// A supplier or subcontractor company.
    #[serde(rename = "Supplier / Subcontractor", alias = "Supplier/Subcontractor")]
    SupplierSubcontractor,
    /// A project manager or administrator.
    #[serde(rename = "Project Manager / Admin", alias = "Project Manager/Admin")]
    ProjectManagerAdmin,
    /// Used when the request does not name a role.
    #[default]
    #[serde(rename = "General User")]
    GeneralUser,
}

impl UserRole {
    /// Human-readable role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConstructionWorker => "Construction Worker",
            Self::SupplierSubcontractor => "Supplier / Subcontractor",
            Self::ProjectManagerAdmin => "Project Manager / Admin",
            Self::GeneralUser => "General User",
        }
    }

    /// Guidance added to the prompt so the answer fits the reader.
    pub fn persona_instruction(&self) -> &'static str {
        match self {
            Self::ConstructionWorker => {
                "The user is a construction worker. Use plain language and focus on \
                 practical steps they can take on site or in the mobile app."
            }
            Self::SupplierSubcontractor => {
                "The user is a supplier or subcontractor. Focus on company registration, \
                 crew lists, reporting duties and what they must deliver to the main contractor."
            }
            Self::ProjectManagerAdmin => {
                "The user is a project manager or administrator. Include configuration \
                 details, project setup and administrative workflows where relevant."
            }
            Self::GeneralUser => {
                "The user has not stated a role. Give a clear, general answer suitable \
                 for anyone using the system."
            }
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A user question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The question as typed by the user.
    pub message: String,
    /// The user's role; absent or `null` means [`UserRole::GeneralUser`].
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_role: UserRole,
}

impl ChatRequest {
    /// Create a request from a general user.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), user_role: UserRole::GeneralUser }
    }

    /// Set the user role.
    pub fn with_role(mut self, role: UserRole) -> Self {
        self.user_role = role;
        self
    }
}

/// A structured answer, as produced by the generative model.
///
/// If `fallback_message` is set, `answer` and `citations` are empty. If
/// `suggested_queries` is non-empty, `answer` is a short acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The answer text.
    pub answer: String,
    /// Sources backing the answer.
    #[serde(default)]
    pub citations: Vec<SourceCitation>,
    /// The model's self-reported confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Message shown instead of an answer that failed the confidence check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_message: Option<String>,
    /// Clarifying questions offered when the query was ambiguous.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_queries: Option<Vec<String>>,
}

impl ChatResponse {
    /// A response carrying only an answer.
    pub fn answer(answer: impl Into<String>) -> Self {
        Self { answer: answer.into(), ..Self::default() }
    }

    /// Set the self-reported confidence.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Set the suggested follow-up queries.
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggested_queries = Some(suggestions);
        self
    }

    /// The suggested queries, if any were given and the list is non-empty.
    pub fn suggestions(&self) -> Option<&[String]> {
        self.suggested_queries.as_deref().filter(|s| !s.is_empty())
    }
}
