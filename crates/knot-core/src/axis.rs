use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

// Axis: a named dimension outside a variable's static shape
//
// Static axes address a shape dimension by index. Dynamic axes are named
// dimensions whose extent is only known at runtime (batch, sequence length)
// and live in a variable's dynamic-axis list rather than in its shape.
//
// Two axes are equal when they are the same kind and have the same index
// (static) or the same name (dynamic). Whether a dynamic axis is ordered
// does not take part in identity.

const DEFAULT_DYNAMIC_AXIS_NAME: &str = "defaultDynamicAxis";
const DEFAULT_BATCH_AXIS_NAME: &str = "defaultBatchAxis";

/// A static or dynamic axis.
#[derive(Debug, Clone)]
pub enum Axis {
    Static(usize),
    Dynamic { name: String, ordered: bool },
}

impl Axis {
    /// An ordered dynamic axis (a sequence axis).
    pub fn new(name: impl Into<String>) -> Self {
        Axis::Dynamic {
            name: name.into(),
            ordered: true,
        }
    }

    /// An unordered dynamic axis (a batch-like axis).
    pub fn unordered(name: impl Into<String>) -> Self {
        Axis::Dynamic {
            name: name.into(),
            ordered: false,
        }
    }

    pub fn static_axis(index: usize) -> Self {
        Axis::Static(index)
    }

    /// The default sequence axis, rendered `*` in variable descriptions.
    pub fn default_dynamic_axis() -> Self {
        Axis::new(DEFAULT_DYNAMIC_AXIS_NAME)
    }

    /// The default batch axis, rendered `#` in variable descriptions.
    pub fn default_batch_axis() -> Self {
        Axis::unordered(DEFAULT_BATCH_AXIS_NAME)
    }

    /// A fresh ordered dynamic axis whose name no other call returns.
    pub fn new_unique_dynamic_axis(prefix: &str) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Axis::new(format!("{prefix}_{n}"))
    }

    pub fn name(&self) -> String {
        match self {
            Axis::Static(i) => format!("staticAxisIdx={i}"),
            Axis::Dynamic { name, .. } => name.clone(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Axis::Dynamic { .. })
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self, Axis::Dynamic { ordered: true, .. })
    }

    pub fn is_default_batch_axis(&self) -> bool {
        matches!(self, Axis::Dynamic { name, .. } if name == DEFAULT_BATCH_AXIS_NAME)
    }

    pub fn is_default_dynamic_axis(&self) -> bool {
        matches!(self, Axis::Dynamic { name, .. } if name == DEFAULT_DYNAMIC_AXIS_NAME)
    }

    /// Short form used in variable descriptions.
    pub(crate) fn short_name(&self) -> String {
        if self.is_default_batch_axis() {
            "#".to_string()
        } else if self.is_default_dynamic_axis() {
            "*".to_string()
        } else {
            self.name()
        }
    }
}

impl PartialEq for Axis {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Axis::Static(a), Axis::Static(b)) => a == b,
            (Axis::Dynamic { name: a, .. }, Axis::Dynamic { name: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Axis {}

impl Hash for Axis {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Axis::Static(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            Axis::Dynamic { name, .. } => {
                1u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Render an axis list as `[a, b]`, optionally last-to-first.
pub(crate) fn render_axes(axes: &[Axis], reverse: bool) -> String {
    let mut names: Vec<String> = axes.iter().map(Axis::short_name).collect();
    if reverse {
        names.reverse();
    }
    format!("[{}]", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_ordering() {
        assert_eq!(Axis::new("time"), Axis::unordered("time"));
        assert_ne!(Axis::new("time"), Axis::new("batch"));
        assert_ne!(Axis::static_axis(0), Axis::new("staticAxisIdx=0"));
    }

    #[test]
    fn test_hash_consistent_with_eq() {
        let mut set = HashSet::new();
        assert!(set.insert(Axis::new("time")));
        assert!(!set.insert(Axis::unordered("time")));
        assert!(set.insert(Axis::static_axis(1)));
    }

    #[test]
    fn test_unique_dynamic_axes() {
        let a = Axis::new_unique_dynamic_axis("seq");
        let b = Axis::new_unique_dynamic_axis("seq");
        assert_ne!(a, b);
        assert!(a.name().starts_with("seq_"));
    }

    #[test]
    fn test_render_axes() {
        let axes = vec![Axis::default_dynamic_axis(), Axis::default_batch_axis()];
        assert_eq!(render_axes(&axes, false), "[*, #]");
        assert_eq!(render_axes(&axes, true), "[#, *]");
        assert_eq!(render_axes(&[], false), "[]");
        assert_eq!(render_axes(&[Axis::new("time")], false), "[time]");
    }
}
