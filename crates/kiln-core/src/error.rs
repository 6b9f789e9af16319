//! Error types for Kiln CI.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Definition errors
    #[error("Definition not found: {0}")]
    UnknownDefinition(String),

    #[error("Definition '{definition}' names unknown parent '{parent}'")]
    UnknownParent { definition: String, parent: String },

    #[error("Cyclic ancestry: '{definition}' revisited via {}", chain.join(" -> "))]
    CyclicAncestry {
        definition: String,
        chain: Vec<String>,
    },

    #[error(
        "Cannot resolve attribute '{attribute}' of '{definition}' (ancestry position {position}): {reason}"
    )]
    AttributeResolution {
        definition: String,
        attribute: String,
        position: usize,
        reason: String,
    },

    // Assembly errors
    #[error("Unresolved property '{property}' required by {context}")]
    UnresolvedProperty { property: String, context: String },

    #[error("Cyclic property references among {}", .properties.join(", "))]
    CyclicProperty { properties: Vec<String> },

    #[error("Invalid working directory '{workdir}' for step '{step}'")]
    InvalidWorkdir { step: String, workdir: String },

    // Collaborator errors
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Execution engine error: {0}")]
    Execution(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors raised while flattening definitions.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownDefinition(_)
                | Error::UnknownParent { .. }
                | Error::CyclicAncestry { .. }
                | Error::AttributeResolution { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_message_names_chain() {
        let err = Error::CyclicAncestry {
            definition: "a".to_string(),
            chain: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Cyclic ancestry: 'a' revisited via a -> b -> a");
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_attribute_message_names_position() {
        let err = Error::AttributeResolution {
            definition: "cpp-cuda".to_string(),
            attribute: "steps".to_string(),
            position: 1,
            reason: "merge is not valid for a list".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'steps'"));
        assert!(msg.contains("'cpp-cuda'"));
        assert!(msg.contains("position 1"));
    }
}
