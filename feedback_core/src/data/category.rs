use std::collections::HashSet;

use serde::Deserialize;
use thiserror::Error;

/// One area that the form asks for feedback on.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Deserialize)]
pub struct FeedbackCategory {
    /// The key under which responses for this category are stored, e.g.
    /// "requirementsAnalysis".
    pub id: String,
    /// A short heading shown above the rating widget.
    pub title: String,
    /// Prompt text shown in the empty comment box.
    pub placeholder: String,
}

/// The ordered set of categories that the form collects feedback for. The
/// order here is the order in which responses are persisted and displayed.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CategoryList {
    categories: Vec<FeedbackCategory>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CategoryError {
    #[error("At least one feedback category must be configured.")]
    Empty,
    #[error("Feedback category `{0}` is configured more than once.")]
    DuplicateId(String),
    #[error("Feedback category configuration is malformed: {0}")]
    Malformed(String),
}

impl CategoryList {
    /// Creates a list from the given categories. Fails if the list is empty or
    /// if two categories share an id.
    pub fn new(categories: Vec<FeedbackCategory>) -> Result<Self, CategoryError> {
        if categories.is_empty() {
            return Err(CategoryError::Empty);
        }
        let mut seen = HashSet::new();
        for category in &categories {
            if !seen.insert(category.id.as_str()) {
                return Err(CategoryError::DuplicateId(category.id.clone()));
            }
        }
        Ok(Self { categories })
    }

    /// Parses a JSON array of `{id, title, placeholder}` objects.
    pub fn from_json(json: &str) -> Result<Self, CategoryError> {
        let categories: Vec<FeedbackCategory> =
            serde_json::from_str(json).map_err(|e| CategoryError::Malformed(e.to_string()))?;
        Self::new(categories)
    }

    /// The six areas the feedback form ships with.
    pub fn builtin() -> Self {
        let categories = BUILTIN_AREAS
            .iter()
            .map(|&(id, title, placeholder)| FeedbackCategory {
                id: id.to_string(),
                title: title.to_string(),
                placeholder: placeholder.to_string(),
            })
            .collect();
        Self { categories }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedbackCategory> {
        self.categories.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|category| category.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&FeedbackCategory> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl Default for CategoryList {
    fn default() -> Self {
        Self::builtin()
    }
}

const BUILTIN_AREAS: [(&str, &str, &str); 6] = [
    (
        "requirementsAnalysis",
        "Requirements Elicitation & Analysis",
        "How effective am I at identifying and analyzing business needs? How well do I handle \
         requirement conflicts and changes? What could be improved in my elicitation techniques?",
    ),
    (
        "clientCommunication",
        "Client Communication & Stakeholder Management",
        "How well do I communicate with clients and manage stakeholder relationships? How \
         effectively do I handle difficult conversations and negotiate solutions? What could be \
         improved?",
    ),
    (
        "problemSolving",
        "Problem-Solving & Analytical Skills",
        "How well do I analyze and solve complex business problems? How effective are my \
         proposed solutions? What could be improved in my analytical approach?",
    ),
    (
        "documentation",
        "Documentation & Modeling",
        "How clear and effective are my documentation and models? How well do they serve their \
         intended audience? What aspects of my documentation could be improved?",
    ),
    (
        "professionalism",
        "Professionalism & Collaboration",
        "How well do I collaborate with different teams (technical, business, etc.)? How \
         professional is my conduct? What could be improved in my collaborative approach?",
    ),
    (
        "communityEngagement",
        "Community Engagement",
        "How do I contribute to the BA community? How effectively do I share knowledge and \
         support others? What more could I do to engage with the community?",
    ),
];
