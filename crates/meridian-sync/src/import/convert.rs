//! Typing of raw connector values against the object type schema.

use meridian_connector::import::{ConnectedSystemImportObject, ImportValue};
use meridian_connector::schema::{
    AttributeDataType, ConnectedSystemAttribute, ConnectedSystemObjectType, IdentifierType,
};
use uuid::Uuid;

use crate::dedup::deduplicate;
use crate::error::{SyncError, SyncResult};
use crate::value::AttributeValue;

/// Deduplicated incoming values for one attribute.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IncomingValues {
    Scalars(Vec<AttributeValue>),
    /// Source tokens naming referenced objects.
    References(Vec<String>),
}

/// External identifier read from an import object.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Identifier {
    pub kind: IdentifierType,
    pub value: AttributeValue,
}

/// Convert one raw value for a scalar attribute.
pub(crate) fn convert_scalar(
    attribute: &ConnectedSystemAttribute,
    raw: &ImportValue,
) -> SyncResult<AttributeValue> {
    let value = match (attribute.data_type, raw) {
        (AttributeDataType::Text, ImportValue::Text(v)) => AttributeValue::Text(v.clone()),
        (AttributeDataType::Number, ImportValue::Integer(v)) => AttributeValue::Integer(*v),
        (AttributeDataType::Guid, ImportValue::Guid(v)) => AttributeValue::Guid(*v),
        (AttributeDataType::Guid, ImportValue::Text(v)) => {
            let parsed = Uuid::parse_str(v).map_err(|e| {
                SyncError::invalid_value(&attribute.name, format!("'{v}' is not a guid: {e}"))
            })?;
            AttributeValue::Guid(parsed)
        }
        (AttributeDataType::Boolean, ImportValue::Boolean(v)) => AttributeValue::Boolean(*v),
        (AttributeDataType::DateTime, ImportValue::DateTime(v)) => AttributeValue::DateTime(*v),
        (data_type, raw) => {
            return Err(SyncError::invalid_value(
                &attribute.name,
                format!("expected {data_type}, got {}", raw.kind()),
            ))
        }
    };
    Ok(value)
}

/// Type, deduplicate and plurality-check the raw values of one attribute.
pub(crate) fn incoming_values(
    attribute: &ConnectedSystemAttribute,
    raw: &[ImportValue],
) -> SyncResult<IncomingValues> {
    let incoming = if attribute.is_reference() {
        let tokens = raw
            .iter()
            .map(|v| match v {
                ImportValue::Text(token) => Ok(token.clone()),
                other => Err(SyncError::invalid_value(
                    &attribute.name,
                    format!("expected reference token, got {}", other.kind()),
                )),
            })
            .collect::<SyncResult<Vec<_>>>()?;
        IncomingValues::References(deduplicate(&tokens))
    } else {
        let values = raw
            .iter()
            .map(|v| convert_scalar(attribute, v))
            .collect::<SyncResult<Vec<_>>>()?;
        IncomingValues::Scalars(deduplicate(&values))
    };

    let count = match &incoming {
        IncomingValues::Scalars(values) => values.len(),
        IncomingValues::References(tokens) => tokens.len(),
    };
    if count > 1 && !attribute.is_multi_valued() {
        return Err(SyncError::invalid_value(
            &attribute.name,
            format!("single-valued attribute supplied {count} distinct values"),
        ));
    }
    Ok(incoming)
}

/// Read the external identifier of an import object.
///
/// The primary identifier is used when the object carries a value for it;
/// the secondary only when it does not.
pub(crate) fn read_identifier(
    object_type: &ConnectedSystemObjectType,
    object: &ConnectedSystemImportObject,
) -> SyncResult<Option<Identifier>> {
    let candidates = [
        (IdentifierType::Primary, object_type.primary_external_id()),
        (IdentifierType::Secondary, object_type.secondary_external_id()),
    ];
    for (kind, attribute) in candidates {
        let Some(attribute) = attribute else {
            continue;
        };
        let raw = object.get_values(&attribute.name).unwrap_or_default();
        if let IncomingValues::Scalars(values) = incoming_values(attribute, raw)? {
            if let Some(value) = values.into_iter().next() {
                return Ok(Some(Identifier { kind, value }));
            }
        }
    }
    Ok(None)
}
