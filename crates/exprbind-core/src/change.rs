#![forbid(unsafe_code)]

//! Change records delivered to write-type handlers and attribute observers.

use std::fmt;

use crate::error::{AccessError, Result};
use crate::object::{Object, ObjectId, ObjectRef};
use crate::value::Value;

/// What kind of mutation produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// First assignment of a value (including a default computed by a read binding).
    Create,
    Update,
    Delete,
    /// A notification without a stored value.
    Event,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Event => "event",
        }
    }
}

/// `(name, old_value, new_value, owner)` plus the change kind.
///
/// Exposed to write-type expression bodies under the reserved name `change`
/// as a read-only object with attributes `type`, `object`, `name`,
/// `oldvalue` and `value`.
pub struct ChangeRecord {
    id: ObjectId,
    kind: ChangeKind,
    owner: ObjectRef,
    name: String,
    old_value: Value,
    new_value: Value,
}

impl ChangeRecord {
    pub fn new(
        kind: ChangeKind,
        owner: ObjectRef,
        name: impl Into<String>,
        old_value: Value,
        new_value: Value,
    ) -> Self {
        Self {
            id: ObjectId::next(),
            kind,
            owner,
            name: name.into(),
            old_value,
            new_value,
        }
    }

    /// An `Update` record.
    pub fn update(owner: ObjectRef, name: impl Into<String>, old: Value, new: Value) -> Self {
        Self::new(ChangeKind::Update, owner, name, old, new)
    }

    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    #[must_use]
    pub fn owner(&self) -> &ObjectRef {
        &self.owner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn old_value(&self) -> &Value {
        &self.old_value
    }

    #[must_use]
    pub fn new_value(&self) -> &Value {
        &self.new_value
    }
}

impl Object for ChangeRecord {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn type_name(&self) -> &str {
        "Change"
    }

    fn has_attr(&self, name: &str) -> bool {
        matches!(name, "type" | "object" | "name" | "oldvalue" | "value")
    }

    fn get_attr(&self, name: &str) -> Result<Option<Value>> {
        Ok(match name {
            "type" => Some(Value::str(self.kind.as_str())),
            "object" => Some(Value::Object(ObjectRef::clone(&self.owner))),
            "name" => Some(Value::str(&self.name)),
            "oldvalue" => Some(self.old_value.clone()),
            "value" => Some(self.new_value.clone()),
            _ => None,
        })
    }

    fn set_attr(&self, name: &str, _value: Value) -> Result<()> {
        if self.has_attr(name) {
            Err(AccessError::read_only("Change", name).into())
        } else {
            Err(AccessError::no_such_attribute("Change", name).into())
        }
    }
}

impl fmt::Debug for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRecord")
            .field("type", &self.kind)
            .field("object", &crate::object::describe(self.owner.as_ref()))
            .field("name", &self.name)
            .field("oldvalue", &self.old_value)
            .field("value", &self.new_value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::BindError;

    struct Owner(ObjectId);

    impl Object for Owner {
        fn object_id(&self) -> ObjectId {
            self.0
        }
        fn type_name(&self) -> &str {
            "Owner"
        }
        fn has_attr(&self, _name: &str) -> bool {
            false
        }
        fn get_attr(&self, _name: &str) -> Result<Option<Value>> {
            Ok(None)
        }
        fn set_attr(&self, name: &str, _value: Value) -> Result<()> {
            Err(AccessError::no_such_attribute("Owner", name).into())
        }
    }

    fn record() -> ChangeRecord {
        let owner: ObjectRef = Rc::new(Owner(ObjectId::next()));
        ChangeRecord::update(owner, "text", Value::str("a"), Value::str("b"))
    }

    #[test]
    fn exposes_fields_as_attributes() {
        let change = record();
        assert_eq!(change.get_attr("value").unwrap(), Some(Value::str("b")));
        assert_eq!(change.get_attr("oldvalue").unwrap(), Some(Value::str("a")));
        assert_eq!(change.get_attr("name").unwrap(), Some(Value::str("text")));
        assert_eq!(change.get_attr("type").unwrap(), Some(Value::str("update")));
        let object = change.get_attr("object").unwrap().unwrap();
        assert_eq!(
            object.as_object().map(|o| o.object_id()),
            Some(change.owner().object_id())
        );
        assert_eq!(change.get_attr("missing").unwrap(), None);
    }

    #[test]
    fn is_read_only() {
        let change = record();
        let err = change.set_attr("value", Value::None).unwrap_err();
        assert_eq!(
            err,
            BindError::Access(AccessError::read_only("Change", "value"))
        );
    }
}
