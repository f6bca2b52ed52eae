use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, Weak};

use crate::axis::{render_axes, Axis};
use crate::config;
use crate::device::DeviceDescriptor;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::init::{DeferredInit, Initializer};
use crate::shape::Shape;
use crate::uid::generate_uid;
use crate::value::{DenseValue, TensorValue};

// Variable: a single point of data flow in a computation graph
//
// Inputs, operator outputs, trainable parameters, constants and
// placeholders are all Variables. A Variable is a handle:
//
//   Variable<V> { inner: Arc<VariableFields<V>> }
//
// Cloning the handle (Clone) is O(1) and refers to the SAME node; every
// graph, operator or caller holding a handle shares ownership, and the node
// is freed with its last handle. `clone_node` creates a NEW node (new uid,
// deep-copied value) and is only defined for free-standing variables.
//
// Most fields are fixed at construction. The mutable parts are:
//
//   value      Unset -> Pending(init) -> Initializing(init) -> Set(value)
//              guarded by a Mutex + Condvar. The initializer runs with
//              the mutex released; concurrent readers block on the Condvar
//              until the first reader publishes the result.
//   version    relaxed atomic bumped each time the value is published
//   name       display only, not identity
//   owner      set once by the operator producing this variable; a plain
//              FunctionId, so it never keeps the operator alive
//   alias      the variable this one stands in for inside an inlined
//              composite; held weakly, so alias cycles never leak, and
//              never carried over by clone_node

/// What role a variable plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Input,
    Output,
    Parameter,
    Constant,
    Placeholder,
}

impl VariableKind {
    pub fn name(&self) -> &'static str {
        match self {
            VariableKind::Input => "Input",
            VariableKind::Output => "Output",
            VariableKind::Parameter => "Parameter",
            VariableKind::Constant => "Constant",
            VariableKind::Placeholder => "Placeholder",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Process-unique identifier of a variable node. Graph arenas key on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Identifier of the operator that produces an output variable.
///
/// The operator layer owns its functions; a variable only records the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u64);

enum ValueState<V> {
    Unset,
    Pending(DeferredInit<V>),
    Initializing(DeferredInit<V>),
    Set(V),
}

struct VariableFields<V> {
    id: NodeId,
    shape: Shape,
    kind: VariableKind,
    dtype: DType,
    owner: OnceLock<FunctionId>,
    value: Mutex<ValueState<V>>,
    value_ready: Condvar,
    value_version: AtomicU64,
    needs_gradient: bool,
    name: RwLock<String>,
    dynamic_axes: Vec<Axis>,
    is_sparse: bool,
    uid: String,
    alias: RwLock<Option<Weak<VariableFields<V>>>>,
}

/// Everything needed to construct a variable.
///
/// An empty `uid` is replaced by one generated from `kind`.
#[derive(Debug, Clone)]
pub struct VariableSpec<V> {
    pub shape: Shape,
    pub kind: VariableKind,
    pub dtype: DType,
    pub owner: Option<FunctionId>,
    pub value: Option<V>,
    pub needs_gradient: bool,
    pub dynamic_axes: Vec<Axis>,
    pub is_sparse: bool,
    pub name: String,
    pub uid: String,
}

impl<V> VariableSpec<V> {
    /// Defaults: no owner, no value, dense, unnamed, no dynamic axes, and
    /// gradients only for parameters.
    pub fn new(shape: impl Into<Shape>, kind: VariableKind, dtype: DType) -> Self {
        VariableSpec {
            shape: shape.into(),
            kind,
            dtype,
            owner: None,
            value: None,
            needs_gradient: kind == VariableKind::Parameter,
            dynamic_axes: Vec::new(),
            is_sparse: false,
            name: String::new(),
            uid: String::new(),
        }
    }
}

/// Builder over [`VariableSpec`], see [`Variable::builder`].
#[derive(Debug, Clone)]
pub struct VariableBuilder<V> {
    spec: VariableSpec<V>,
}

impl<V: TensorValue> VariableBuilder<V> {
    pub fn with_owner(mut self, owner: FunctionId) -> Self {
        self.spec.owner = Some(owner);
        self
    }

    pub fn with_value(mut self, value: V) -> Self {
        self.spec.value = Some(value);
        self
    }

    pub fn with_needs_gradient(mut self, needs_gradient: bool) -> Self {
        self.spec.needs_gradient = needs_gradient;
        self
    }

    pub fn with_dynamic_axes(mut self, axes: Vec<Axis>) -> Self {
        self.spec.dynamic_axes = axes;
        self
    }

    pub fn with_sparse(mut self, is_sparse: bool) -> Self {
        self.spec.is_sparse = is_sparse;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.spec.name = name.into();
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.spec.uid = uid.into();
        self
    }

    pub fn build(self) -> Result<Variable<V>> {
        Variable::new(self.spec)
    }
}

/// A shared handle to a variable node.
///
/// `Display` renders the node as `Kind('name-or-uid', [shape], [axes])`;
/// every error about a variable embeds this string.
pub struct Variable<V = DenseValue> {
    inner: Arc<VariableFields<V>>,
}

impl<V: TensorValue> Clone for Variable<V> {
    fn clone(&self) -> Self {
        Variable {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// `kind('label', first, second)` with the segments ordered by the
/// process-wide rendering flag.
fn describe(
    kind: VariableKind,
    name: &str,
    uid: &str,
    shape: &Shape,
    axes: &[Axis],
) -> String {
    let label = if name.is_empty() { uid } else { name };
    if config::reverse_shapes_in_messages() {
        format!(
            "{}('{}', {}, {})",
            kind,
            label,
            render_axes(axes, true),
            shape.render_reversed()
        )
    } else {
        format!(
            "{}('{}', {}, {})",
            kind,
            label,
            shape,
            render_axes(axes, false)
        )
    }
}

/// Publishes the outcome of a deferred initialization. If dropped without
/// `finish` (the policy panicked) the initializer is re-armed so waiting
/// readers do not block forever.
struct InitInFlight<'a, V> {
    fields: &'a VariableFields<V>,
    init: Option<DeferredInit<V>>,
}

impl<V: TensorValue> InitInFlight<'_, V> {
    fn finish(mut self, outcome: Option<V>) -> Option<V> {
        let init = self.init.take();
        let mut state = self.fields.lock_value();
        match (outcome, init) {
            (Some(value), _) => {
                *state = ValueState::Set(value);
                self.fields.value_version.fetch_add(1, Ordering::Relaxed);
            }
            (None, Some(init)) => *state = ValueState::Pending(init),
            (None, None) => *state = ValueState::Unset,
        }
        self.fields.value_ready.notify_all();
        let published = match &*state {
            ValueState::Set(v) => Some(v.clone()),
            _ => None,
        };
        published
    }
}

impl<V> Drop for InitInFlight<'_, V> {
    fn drop(&mut self) {
        if let Some(init) = self.init.take() {
            let mut state = self
                .fields
                .value
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *state = ValueState::Pending(init);
            self.fields.value_ready.notify_all();
        }
    }
}

impl<V> VariableFields<V> {
    fn lock_value(&self) -> MutexGuard<'_, ValueState<V>> {
        self.value.lock().expect("variable value lock poisoned")
    }

    fn name(&self) -> String {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn render(&self) -> String {
        describe(
            self.kind,
            &self.name(),
            &self.uid,
            &self.shape,
            &self.dynamic_axes,
        )
    }
}

impl<V: TensorValue> VariableFields<V> {
    fn check_value(&self, value: &V) -> Result<()> {
        if value.dtype() != self.dtype {
            return Err(Error::TypeMismatch {
                node: self.render(),
                expected: self.dtype,
                got: value.dtype(),
            });
        }
        if self.shape.is_concrete() && value.shape() != &self.shape {
            return Err(Error::ShapeMismatch {
                node: self.render(),
                expected: self.shape.clone(),
                got: value.shape().clone(),
            });
        }
        Ok(())
    }
}

impl<V: TensorValue> Variable<V> {
    /// Construct a variable.
    ///
    /// Fails with [`Error::TypeMismatch`] if `spec.value` has a different
    /// element type than `spec.dtype`, then with [`Error::DuplicateAxis`] on
    /// the first dynamic axis that repeats an earlier one.
    pub fn new(spec: VariableSpec<V>) -> Result<Self> {
        let VariableSpec {
            shape,
            kind,
            dtype,
            owner,
            value,
            needs_gradient,
            dynamic_axes,
            is_sparse,
            name,
            uid,
        } = spec;
        let uid = if uid.is_empty() {
            generate_uid(kind)
        } else {
            uid
        };

        if let Some(v) = &value {
            if v.dtype() != dtype {
                return Err(Error::TypeMismatch {
                    node: describe(kind, &name, &uid, &shape, &dynamic_axes),
                    expected: dtype,
                    got: v.dtype(),
                });
            }
        }

        let mut seen = HashSet::with_capacity(dynamic_axes.len());
        for axis in &dynamic_axes {
            if !seen.insert(axis) {
                return Err(Error::DuplicateAxis {
                    axis: axis.name(),
                    node: describe(kind, &name, &uid, &shape, &dynamic_axes),
                });
            }
        }

        let state = match value {
            Some(v) => ValueState::Set(v),
            None => ValueState::Unset,
        };

        Ok(Variable {
            inner: Arc::new(VariableFields {
                id: NodeId::next(),
                shape,
                kind,
                dtype,
                owner: owner.map(OnceLock::from).unwrap_or_default(),
                value: Mutex::new(state),
                value_ready: Condvar::new(),
                value_version: AtomicU64::new(0),
                needs_gradient,
                name: RwLock::new(name),
                dynamic_axes,
                is_sparse,
                uid,
                alias: RwLock::new(None),
            }),
        })
    }

    pub fn builder(shape: impl Into<Shape>, kind: VariableKind, dtype: DType) -> VariableBuilder<V> {
        VariableBuilder {
            spec: VariableSpec::new(shape, kind, dtype),
        }
    }

    /// A graph input fed at evaluation time.
    pub fn input(shape: impl Into<Shape>, dtype: DType, dynamic_axes: Vec<Axis>) -> Result<Self> {
        Self::builder(shape, VariableKind::Input, dtype)
            .with_dynamic_axes(dynamic_axes)
            .build()
    }

    /// A trainable parameter without a value yet; arm it with
    /// [`Variable::set_deferred_initialization`] or bind one with
    /// [`Variable::set_value`].
    pub fn parameter(shape: impl Into<Shape>, dtype: DType, name: impl Into<String>) -> Result<Self> {
        Self::builder(shape, VariableKind::Parameter, dtype)
            .with_name(name)
            .build()
    }

    /// A trainable parameter with its shape and type taken from `value`.
    pub fn parameter_with_value(value: V, name: impl Into<String>) -> Result<Self> {
        Self::builder(value.shape().clone(), VariableKind::Parameter, value.dtype())
            .with_name(name)
            .with_value(value)
            .build()
    }

    /// A constant with its shape and type taken from `value`.
    pub fn constant(value: V, name: impl Into<String>) -> Result<Self> {
        Self::builder(value.shape().clone(), VariableKind::Constant, value.dtype())
            .with_name(name)
            .with_value(value)
            .build()
    }

    pub fn placeholder(shape: impl Into<Shape>, dtype: DType, dynamic_axes: Vec<Axis>) -> Result<Self> {
        Self::builder(shape, VariableKind::Placeholder, dtype)
            .with_dynamic_axes(dynamic_axes)
            .build()
    }

    /// An output of the operator `owner`.
    pub fn output(
        shape: impl Into<Shape>,
        dtype: DType,
        owner: FunctionId,
        dynamic_axes: Vec<Axis>,
    ) -> Result<Self> {
        Self::builder(shape, VariableKind::Output, dtype)
            .with_owner(owner)
            .with_needs_gradient(true)
            .with_dynamic_axes(dynamic_axes)
            .build()
    }

    // Accessors

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn uid(&self) -> &str {
        &self.inner.uid
    }

    pub fn name(&self) -> String {
        self.inner.name()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self
            .inner
            .name
            .write()
            .unwrap_or_else(PoisonError::into_inner) = name.into();
    }

    pub fn kind(&self) -> VariableKind {
        self.inner.kind
    }

    pub fn shape(&self) -> &Shape {
        &self.inner.shape
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn needs_gradient(&self) -> bool {
        self.inner.needs_gradient
    }

    pub fn is_sparse(&self) -> bool {
        self.inner.is_sparse
    }

    pub fn dynamic_axes(&self) -> &[Axis] {
        &self.inner.dynamic_axes
    }

    pub fn owner(&self) -> Option<FunctionId> {
        self.inner.owner.get().copied()
    }

    pub fn is_input(&self) -> bool {
        self.inner.kind == VariableKind::Input
    }

    pub fn is_output(&self) -> bool {
        self.inner.kind == VariableKind::Output
    }

    pub fn is_parameter(&self) -> bool {
        self.inner.kind == VariableKind::Parameter
    }

    pub fn is_constant(&self) -> bool {
        self.inner.kind == VariableKind::Constant
    }

    pub fn is_placeholder(&self) -> bool {
        self.inner.kind == VariableKind::Placeholder
    }

    /// Whether two handles refer to the same node.
    pub fn same_node(a: &Variable<V>, b: &Variable<V>) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Number of live handles to this node.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Record the operator producing this variable. Can be done once.
    pub fn set_owner(&self, owner: FunctionId) -> Result<()> {
        self.inner.owner.set(owner).map_err(|_| {
            Error::msg(format!(
                "variable {} already has an owner ({:?})",
                self,
                self.owner()
            ))
        })
    }

    // Alias

    /// The variable this one stands in for, if any and still alive.
    pub fn alias(&self) -> Option<Variable<V>> {
        self.inner
            .alias
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Variable { inner })
    }

    pub fn set_alias(&self, target: &Variable<V>) -> Result<()> {
        if Self::same_node(self, target) {
            return Err(Error::msg(format!("variable {} cannot alias itself", self)));
        }
        *self
            .inner
            .alias
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::downgrade(&target.inner));
        Ok(())
    }

    pub fn clear_alias(&self) {
        *self
            .inner
            .alias
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    // Value

    /// Incremented every time a value is published; relaxed, for change
    /// detection only.
    pub fn value_version(&self) -> u64 {
        self.inner.value_version.load(Ordering::Relaxed)
    }

    pub fn has_value(&self) -> bool {
        matches!(&*self.inner.lock_value(), ValueState::Set(_))
    }

    /// Whether a deferred initializer is armed or running.
    pub fn has_pending_initializer(&self) -> bool {
        matches!(
            &*self.inner.lock_value(),
            ValueState::Pending(_) | ValueState::Initializing(_)
        )
    }

    /// The armed deferred initializer, if it has not completed yet.
    pub fn deferred_initializer(&self) -> Option<DeferredInit<V>> {
        match &*self.inner.lock_value() {
            ValueState::Pending(init) | ValueState::Initializing(init) => Some(init.clone()),
            ValueState::Unset | ValueState::Set(_) => None,
        }
    }

    /// Arm a policy to produce this variable's value on first read.
    ///
    /// Fails with [`Error::AlreadyInitialized`] if the variable already has
    /// a value or an armed initializer.
    pub fn set_deferred_initialization(
        &self,
        policy: Arc<dyn Initializer<V>>,
        device: DeviceDescriptor,
    ) -> Result<()> {
        self.arm(DeferredInit::new(policy, device))
    }

    fn arm(&self, init: DeferredInit<V>) -> Result<()> {
        let mut state = self.inner.lock_value();
        if !matches!(&*state, ValueState::Unset) {
            drop(state);
            return Err(Error::AlreadyInitialized {
                node: self.to_string(),
            });
        }
        *state = ValueState::Pending(init);
        Ok(())
    }

    /// The bound value, materializing it from the deferred initializer on
    /// first access.
    ///
    /// Under concurrent first reads exactly one caller runs the policy; the
    /// others block until its result is published and all receive handles
    /// to the same value. If the policy fails, its caller gets the error and
    /// the initializer stays armed; blocked callers then retry it.
    pub fn value(&self) -> Result<V> {
        enum Next<V> {
            Ready(V),
            Wait,
            Run(DeferredInit<V>),
            Missing,
        }

        let fields = &*self.inner;
        let mut state = fields.lock_value();
        loop {
            let next = match &*state {
                ValueState::Set(v) => Next::Ready(v.clone()),
                ValueState::Initializing(_) => Next::Wait,
                ValueState::Pending(init) => Next::Run(init.clone()),
                ValueState::Unset => Next::Missing,
            };
            match next {
                Next::Ready(v) => return Ok(v),
                Next::Wait => {
                    state = fields
                        .value_ready
                        .wait(state)
                        .expect("variable value lock poisoned");
                }
                Next::Missing => {
                    drop(state);
                    return Err(Error::UninitializedValue {
                        node: self.to_string(),
                    });
                }
                Next::Run(init) => {
                    *state = ValueState::Initializing(init.clone());
                    drop(state);
                    return self.materialize(init);
                }
            }
        }
    }

    fn materialize(&self, init: DeferredInit<V>) -> Result<V> {
        let fields = &*self.inner;
        let in_flight = InitInFlight {
            fields,
            init: Some(init.clone()),
        };
        let result = init
            .run(&fields.shape, fields.dtype)
            .and_then(|v| fields.check_value(&v).map(|_| v));
        match result {
            Ok(v) => {
                log::debug!(
                    "materialized value of {} on {} (version {})",
                    self,
                    init.device(),
                    self.value_version() + 1
                );
                in_flight
                    .finish(Some(v))
                    .ok_or_else(|| Error::UninitializedValue {
                        node: self.to_string(),
                    })
            }
            Err(e) => {
                in_flight.finish(None);
                Err(e)
            }
        }
    }

    /// Replace the value of a Parameter or Constant.
    ///
    /// The value must match the variable's type and, when the variable's
    /// shape is concrete, its shape. Any armed initializer is discarded.
    pub fn set_value(&self, value: V) -> Result<()> {
        if !matches!(self.kind(), VariableKind::Parameter | VariableKind::Constant) {
            return Err(Error::InvalidKind {
                node: self.to_string(),
                kind: self.kind().to_string(),
            });
        }
        self.inner.check_value(&value)?;

        let fields = &*self.inner;
        let mut state = fields.lock_value();
        while matches!(&*state, ValueState::Initializing(_)) {
            state = fields
                .value_ready
                .wait(state)
                .expect("variable value lock poisoned");
        }
        *state = ValueState::Set(value);
        let version = fields.value_version.fetch_add(1, Ordering::Relaxed) + 1;
        fields.value_ready.notify_all();
        drop(state);
        log::trace!("replaced value of {} (version {})", self, version);
        Ok(())
    }

    /// A new, independent node with the same declaration.
    ///
    /// The clone gets a fresh uid and [`NodeId`], a deep copy of the bound
    /// value, and the same deferred initializer (same policy, same device)
    /// if one is still armed, so it materializes its own value later. The
    /// alias is not carried over. Output variables cannot be cloned.
    pub fn clone_node(&self) -> Result<Self> {
        if self.owner().is_some() {
            return Err(Error::NotCloneable {
                node: self.to_string(),
            });
        }

        let (value, init) = match &*self.inner.lock_value() {
            ValueState::Unset => (None, None),
            ValueState::Pending(init) | ValueState::Initializing(init) => (None, Some(init.clone())),
            ValueState::Set(v) => (Some(v.deep_clone()), None),
        };

        let fields = &*self.inner;
        let clone = Variable::new(VariableSpec {
            shape: fields.shape.clone(),
            kind: fields.kind,
            dtype: fields.dtype,
            owner: self.owner(),
            value,
            needs_gradient: fields.needs_gradient,
            dynamic_axes: fields.dynamic_axes.clone(),
            is_sparse: fields.is_sparse,
            name: fields.name(),
            uid: generate_uid(fields.kind),
        })?;
        if let Some(init) = init {
            clone.arm(init)?;
        }
        log::trace!("cloned {} as {}", self, clone.uid());
        Ok(clone)
    }
}

impl<V: TensorValue> fmt::Display for Variable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.render())
    }
}

impl<V: TensorValue> fmt::Debug for Variable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("id", &self.inner.id)
            .field("uid", &self.inner.uid)
            .field("kind", &self.inner.kind)
            .field("shape", &self.inner.shape)
            .field("dtype", &self.inner.dtype)
            .field("version", &self.value_version())
            .finish()
    }
}

impl<V: TensorValue> PartialEq for Variable<V> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<V: TensorValue> Eq for Variable<V> {}

impl<V: TensorValue> Hash for Variable<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}
