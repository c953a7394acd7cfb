//! Registry-based value mapping.
//!
//! A [`ValueMapper`] converts values of one representation into another by
//! walking an ordered list of [`ValueTransform`]s. The first transform whose
//! [`handles`](ValueTransform::handles) predicate matches produces the
//! result; a catch-all fallback is always consulted last. Transforms receive
//! the calling mapper so they can recurse into sub-values (list elements,
//! nested resources) through the same registry.
//!
//! Two families ship with the crate:
//!
//! - [`document`] - attribute values to and from JSON documents, used by the
//!   relational document backend.
//! - [`index`] - attribute values to and from prefixed string terms, used by
//!   the search-index backend.
//!
//! Registration order matters: more specific transforms must be registered
//! before generic ones.
//!
//! # Examples
//!
//! ```
//! use trellis_persistence::mapping::document;
//! use trellis_persistence::types::{PropertyValue, ResourceId};
//!
//! let writer = document::writer();
//! let reader = document::reader();
//!
//! let value = PropertyValue::Id(ResourceId::new("page-1"));
//! let json = writer.map(&value).unwrap();
//! assert_eq!(json, serde_json::json!({"id": "page-1"}));
//! assert_eq!(reader.map(&json).unwrap(), value);
//! ```

pub mod document;
pub mod index;

use std::fmt;

use crate::error::StorageResult;

/// One conversion rule in a [`ValueMapper`].
pub trait ValueTransform<I: ?Sized, O>: Send + Sync {
    /// Short name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Returns `true` if this transform converts the value.
    ///
    /// Predicates never fail: a speculative parse that errors is a
    /// negative match (see [`parses`]).
    fn handles(&self, value: &I) -> bool;

    /// Converts the value, recursing through `mapper` for sub-values.
    fn result(&self, value: &I, mapper: &ValueMapper<I, O>) -> StorageResult<O>;
}

/// An ordered registry of value transforms with a catch-all fallback.
pub struct ValueMapper<I: ?Sized, O> {
    transforms: Vec<Box<dyn ValueTransform<I, O>>>,
    fallback: Box<dyn ValueTransform<I, O>>,
}

impl<I: ?Sized, O> ValueMapper<I, O> {
    /// Creates a mapper with only the given fallback.
    pub fn new(fallback: impl ValueTransform<I, O> + 'static) -> Self {
        Self {
            transforms: Vec::new(),
            fallback: Box::new(fallback),
        }
    }

    /// Appends a transform after the ones already registered.
    pub fn register(&mut self, transform: impl ValueTransform<I, O> + 'static) -> &mut Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Appends a transform (builder style).
    pub fn with(mut self, transform: impl ValueTransform<I, O> + 'static) -> Self {
        self.register(transform);
        self
    }

    /// Returns the transform that handles the value.
    pub fn transform_for(&self, value: &I) -> &dyn ValueTransform<I, O> {
        self.transforms
            .iter()
            .find(|t| t.handles(value))
            .map(|t| &**t)
            .unwrap_or(&*self.fallback)
    }

    /// Converts a value.
    pub fn map(&self, value: &I) -> StorageResult<O> {
        self.transform_for(value).result(value, self)
    }

    /// Returns the registered transform names in dispatch order, fallback last.
    pub fn transform_names(&self) -> Vec<&'static str> {
        self.transforms
            .iter()
            .map(|t| t.name())
            .chain(std::iter::once(self.fallback.name()))
            .collect()
    }
}

impl<I: ?Sized, O> fmt::Debug for ValueMapper<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueMapper")
            .field("transforms", &self.transform_names())
            .finish()
    }
}

/// Runs a speculative parse and reports only whether it succeeded.
pub fn parses<T, E>(attempt: impl FnOnce() -> Result<T, E>) -> bool {
    attempt().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    impl ValueTransform<i64, String> for Doubler {
        fn name(&self) -> &'static str {
            "doubler"
        }

        fn handles(&self, value: &i64) -> bool {
            *value > 10
        }

        fn result(&self, value: &i64, mapper: &ValueMapper<i64, String>) -> StorageResult<String> {
            // Recurse with a value the fallback handles.
            Ok(format!("big:{}", mapper.map(&(value / 10))?))
        }
    }

    struct Plain;

    impl ValueTransform<i64, String> for Plain {
        fn name(&self) -> &'static str {
            "plain"
        }

        fn handles(&self, _value: &i64) -> bool {
            true
        }

        fn result(&self, value: &i64, _mapper: &ValueMapper<i64, String>) -> StorageResult<String> {
            Ok(value.to_string())
        }
    }

    struct Never;

    impl ValueTransform<i64, String> for Never {
        fn name(&self) -> &'static str {
            "never"
        }

        fn handles(&self, value: &i64) -> bool {
            parses(|| u8::try_from(*value + 1000))
        }

        fn result(&self, _value: &i64, _mapper: &ValueMapper<i64, String>) -> StorageResult<String> {
            Ok("unreachable".to_string())
        }
    }

    #[test]
    fn test_first_matching_transform_wins() {
        let mapper = ValueMapper::new(Plain).with(Never).with(Doubler);
        assert_eq!(mapper.transform_for(&5).name(), "plain");
        assert_eq!(mapper.transform_for(&50).name(), "doubler");
        assert_eq!(mapper.map(&50).unwrap(), "big:5");
        assert_eq!(mapper.map(&500).unwrap(), "big:big:5");
    }

    #[test]
    fn test_transform_names_in_order() {
        let mapper = ValueMapper::new(Plain).with(Doubler).with(Never);
        assert_eq!(mapper.transform_names(), vec!["doubler", "never", "plain"]);
    }

    #[test]
    fn test_failed_parse_is_negative_match() {
        assert!(!parses(|| "x".parse::<i64>()));
        assert!(parses(|| "42".parse::<i64>()));
    }
}
