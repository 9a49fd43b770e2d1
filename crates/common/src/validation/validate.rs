use crate::domain::DomainError;
use garde::{Report, Validate};

/// Run garde validation and fold any report into `DomainError::ValidationError`
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(format_validation_errors(&report)))
}

fn format_validation_errors(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            let path = path.to_string();
            if path.is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Rename {
        #[garde(length(min = 1, max = 255))]
        name: String,
    }

    #[test]
    fn test_valid_name_passes() {
        let request = Rename {
            name: "Kitchen".to_string(),
        };
        assert!(validate_struct(&request).is_ok());
    }

    #[test]
    fn test_empty_name_reports_field() {
        let request = Rename {
            name: String::new(),
        };
        match validate_struct(&request) {
            Err(DomainError::ValidationError(msg)) => assert!(msg.contains("name")),
            other => panic!("expected ValidationError, got {:?}", other),
        }
    }
}
