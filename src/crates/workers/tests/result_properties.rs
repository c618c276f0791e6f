//! Property tests for the task result contract

use proptest::prelude::*;
use workers::{ErrorKind, Severity, TaskResult};

fn any_kind() -> impl Strategy<Value = ErrorKind> {
    prop_oneof![
        Just(ErrorKind::MissingData),
        Just(ErrorKind::InvalidInput),
        Just(ErrorKind::InvalidParameter),
        Just(ErrorKind::InsufficientData),
        Just(ErrorKind::ProcessingError),
        Just(ErrorKind::ModelError),
        Just(ErrorKind::ValidationError),
        Just(ErrorKind::UnknownError),
        Just(ErrorKind::RecoveryExhausted),
    ]
}

proptest! {
    #[test]
    fn quality_always_within_bounds(score in any::<f64>()) {
        let created = TaskResult::create("h", "t", score, Default::default());
        prop_assert!((0.0..=1.0).contains(&created.quality_score()));

        let mut assigned = TaskResult::new("h", "t");
        assigned.set_quality_score(score);
        prop_assert!((0.0..=1.0).contains(&assigned.quality_score()));

        if (0.0..=1.0).contains(&score) {
            prop_assert_eq!(assigned.quality_score(), score);
        }
    }

    #[test]
    fn serialized_quality_within_bounds(score in -10.0f64..10.0) {
        let value = TaskResult::new("h", "t").with_quality_score(score).to_value();
        let serialized = value["qualityScore"].as_f64().unwrap();
        prop_assert!((0.0..=1.0).contains(&serialized));
    }

    #[test]
    fn warnings_never_grow_errors(
        kind in any_kind(),
        message in "[a-z ]{1,24}",
        existing in 0usize..4,
    ) {
        let mut result = TaskResult::new("h", "t");
        for i in 0..existing {
            result.add_error(ErrorKind::ProcessingError, format!("error {}", i), Severity::Error);
        }
        let warnings_before = result.warnings.len();

        result.add_error(kind, message.clone(), Severity::Warning);

        prop_assert_eq!(result.errors.len(), existing);
        prop_assert_eq!(result.warnings.len(), warnings_before + 1);
        prop_assert_eq!(result.warnings.last(), Some(&message));
        prop_assert!(result.success);
    }
}
