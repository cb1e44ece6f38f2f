//! Resource requirement merging

use std::collections::BTreeMap;

use crate::domain::resources::{Quantity, ResourceName, ResourceRequirements};
use crate::error::PlanError;

/// Merges template-level requirements with run-level overrides
///
/// Each resource class set by `overrides` replaces the value from `base`;
/// classes only one side sets are kept as-is. Returns `None` when neither
/// side specifies requirements.
pub fn merge_resources(
    base: Option<&ResourceRequirements>,
    overrides: Option<&ResourceRequirements>,
) -> Result<Option<ResourceRequirements>, PlanError> {
    if base.is_none() && overrides.is_none() {
        return Ok(None);
    }

    let mut merged = ResourceRequirements::default();
    for source in [base, overrides].into_iter().flatten() {
        apply(&mut merged.limits, &source.limits, "limits")?;
        apply(&mut merged.requests, &source.requests, "requests")?;
    }

    Ok(Some(merged))
}

fn apply(
    target: &mut BTreeMap<ResourceName, Quantity>,
    source: &BTreeMap<ResourceName, Quantity>,
    section: &'static str,
) -> Result<(), PlanError> {
    for (name, quantity) in source {
        quantity
            .validate()
            .map_err(|reason| PlanError::InvalidQuantity {
                section,
                resource: name.clone(),
                value: quantity.as_str().to_string(),
                reason,
            })?;
        target.insert(name.clone(), quantity.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neither_side() {
        assert_eq!(merge_resources(None, None).unwrap(), None);
    }

    #[test]
    fn test_override_replaces_only_same_class() {
        let base = ResourceRequirements::default()
            .with_limit("cpu", "500m")
            .with_limit("memory", "1Gi")
            .with_request("cpu", "250m");
        let overrides = ResourceRequirements::default().with_limit("cpu", "2");

        let merged = merge_resources(Some(&base), Some(&overrides))
            .unwrap()
            .unwrap();

        assert_eq!(merged.limits["cpu"].as_str(), "2");
        assert_eq!(merged.limits["memory"].as_str(), "1Gi");
        assert_eq!(merged.requests["cpu"].as_str(), "250m");
        assert_eq!(merged.limits.len(), 2);
        assert_eq!(merged.requests.len(), 1);
    }

    #[test]
    fn test_single_side_is_copied() {
        let base = ResourceRequirements::default().with_request("memory", "128Mi");
        assert_eq!(
            merge_resources(Some(&base), None).unwrap(),
            Some(base.clone())
        );
        assert_eq!(
            merge_resources(None, Some(&base)).unwrap(),
            Some(base)
        );
    }

    #[test]
    fn test_override_adds_new_class() {
        let base = ResourceRequirements::default().with_limit("cpu", "1");
        let overrides = ResourceRequirements::default().with_request("memory", "2Gi");

        let merged = merge_resources(Some(&base), Some(&overrides))
            .unwrap()
            .unwrap();
        assert_eq!(merged.limits["cpu"].as_str(), "1");
        assert_eq!(merged.requests["memory"].as_str(), "2Gi");
    }

    #[test]
    fn test_invalid_quantity_names_resource() {
        let overrides = ResourceRequirements::default().with_limit("memory", "lots");
        let err = merge_resources(None, Some(&overrides)).unwrap_err();

        match &err {
            PlanError::InvalidQuantity {
                section,
                resource,
                value,
                ..
            } => {
                assert_eq!(*section, "limits");
                assert_eq!(resource, "memory");
                assert_eq!(value, "lots");
            }
        }
        assert!(err.to_string().contains("memory"));
    }
}
