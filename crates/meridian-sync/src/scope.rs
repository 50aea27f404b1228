//! Import scoping.
//!
//! A scope decides whether a CSO of one object type should stay connected to
//! the metaverse. It is evaluated against the CSO's values after an import
//! has updated them.

use meridian_core::{AttributeId, ObjectTypeId};
use serde::{Deserialize, Serialize};

use crate::model::ConnectedSystemObject;
use crate::value::AttributeValue;

/// How the members of a criteria group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopingLogic {
    #[default]
    All,
    Any,
}

/// Comparison applied by one criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopingComparison {
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    Contains,
    IsPresent,
    IsNotPresent,
}

/// One test against one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopingCriterion {
    pub attribute_id: AttributeId,
    pub comparison: ScopingComparison,
    /// Operand; unused by the presence comparisons.
    #[serde(default)]
    pub value: String,
}

impl ScopingCriterion {
    pub fn new(
        attribute_id: AttributeId,
        comparison: ScopingComparison,
        value: impl Into<String>,
    ) -> Self {
        Self {
            attribute_id,
            comparison,
            value: value.into(),
        }
    }

    /// Evaluate against a CSO. Multi-valued attributes satisfy a positive
    /// comparison when any value does.
    #[must_use]
    pub fn evaluate(&self, cso: &ConnectedSystemObject) -> bool {
        let mut values = cso.values(self.attribute_id);
        match self.comparison {
            ScopingComparison::IsPresent => values.next().is_some(),
            ScopingComparison::IsNotPresent => values.next().is_none(),
            ScopingComparison::Equals => values.any(|v| self.equals(v)),
            ScopingComparison::NotEquals => !values.any(|v| self.equals(v)),
            ScopingComparison::StartsWith => {
                values.any(|v| v.to_string().starts_with(self.value.as_str()))
            }
            ScopingComparison::EndsWith => {
                values.any(|v| v.to_string().ends_with(self.value.as_str()))
            }
            ScopingComparison::Contains => {
                values.any(|v| v.to_string().contains(self.value.as_str()))
            }
        }
    }

    fn equals(&self, value: &AttributeValue) -> bool {
        match value {
            AttributeValue::Reference(r) => {
                r.unresolved_token.as_deref() == Some(self.value.as_str())
            }
            scalar => scalar.matches_token(&self.value),
        }
    }
}

/// A tree of criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopingCriteriaGroup {
    #[serde(default)]
    pub logic: ScopingLogic,
    #[serde(default)]
    pub criteria: Vec<ScopingCriterion>,
    #[serde(default)]
    pub groups: Vec<ScopingCriteriaGroup>,
}

impl ScopingCriteriaGroup {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn any() -> Self {
        Self {
            logic: ScopingLogic::Any,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_criterion(mut self, criterion: ScopingCriterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: ScopingCriteriaGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Evaluate the group. An empty group is always in scope.
    #[must_use]
    pub fn evaluate(&self, cso: &ConnectedSystemObject) -> bool {
        if self.criteria.is_empty() && self.groups.is_empty() {
            return true;
        }
        let mut results = self
            .criteria
            .iter()
            .map(|c| c.evaluate(cso))
            .chain(self.groups.iter().map(|g| g.evaluate(cso)));
        match self.logic {
            ScopingLogic::All => results.all(|r| r),
            ScopingLogic::Any => results.any(|r| r),
        }
    }
}

/// What happens to a joined CSO that falls out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfScopeAction {
    /// Break the join.
    #[default]
    Disconnect,
    /// Keep the join and only report the crossing.
    RetainJoin,
}

/// Import scope for one object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportScope {
    pub object_type_id: ObjectTypeId,
    #[serde(default)]
    pub criteria: ScopingCriteriaGroup,
    #[serde(default)]
    pub out_of_scope_action: OutOfScopeAction,
}

impl ImportScope {
    pub fn new(object_type_id: ObjectTypeId, criteria: ScopingCriteriaGroup) -> Self {
        Self {
            object_type_id,
            criteria,
            out_of_scope_action: OutOfScopeAction::Disconnect,
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: OutOfScopeAction) -> Self {
        self.out_of_scope_action = action;
        self
    }

    #[must_use]
    pub fn is_in_scope(&self, cso: &ConnectedSystemObject) -> bool {
        self.criteria.evaluate(cso)
    }
}
