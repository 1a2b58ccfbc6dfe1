//! Registrar workflow state machines.
//!
//! Every status domain (enrollment, grade, transcript evaluation, document
//! request) is a closed enum with its own transition table. Services ask these
//! tables what the next status is and then persist it with a conditional
//! update; nothing writes a status string directly.

use thiserror::Error;

/// Unknown status text read from the store or a client payload
#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct StatusParseError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a status enum stored and transmitted as fixed text.
macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::workflow::StatusParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::workflow::StatusParseError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::workflow::StatusParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub mod document_request;
pub mod enrollment;
pub mod error;
pub mod grade;
pub mod tor;

pub use error::WorkflowError;

/// Outcome of asking a transition table for the next status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<S> {
    /// Persist `to`, guarded on the row still being at `from`.
    Apply { from: S, to: S },
    /// Already where the caller wanted it; repeat calls succeed without writing.
    Unchanged(S),
}

impl<S: Copy> Step<S> {
    pub fn status(&self) -> S {
        match self {
            Step::Apply { to, .. } => *to,
            Step::Unchanged(current) => *current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrollment::EnrollmentStatus;

    #[test]
    fn status_text_round_trips() {
        for status in EnrollmentStatus::ALL {
            let parsed: EnrollmentStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, *status);
        }
        let err = "Enrolled-ish".parse::<EnrollmentStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown enrollment status 'Enrolled-ish'");
    }

    #[test]
    fn statuses_serialize_as_their_display_text() {
        let json = serde_json::to_value(EnrollmentStatus::PendingTor).unwrap();
        assert_eq!(json, serde_json::json!("Pending TOR"));
        let back: EnrollmentStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, EnrollmentStatus::PendingTor);
    }
}
