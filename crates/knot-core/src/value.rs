use std::sync::{Arc, RwLock};

use crate::device::DeviceDescriptor;
use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::shape::Shape;

// TensorValue: the storage handle a variable binds
//
// Variables never look inside tensor data. They need exactly four things
// from a value: its element type (validated against the variable's DType),
// its shape, its device, and a deep copy with independent storage (used
// when a variable is cloned).
//
// `Clone` on a value is a HANDLE clone: both handles see the same storage,
// the way `Tensor` clones share their Arc'd storage. `deep_clone` is the
// only way to get new storage.
//
// DenseValue is the host-memory implementation shipped with this crate.

/// Contract for values bound to a [`Variable`](crate::Variable).
pub trait TensorValue: Clone + Send + Sync + 'static {
    fn dtype(&self) -> DType;

    fn shape(&self) -> &Shape;

    fn device(&self) -> DeviceDescriptor;

    /// A value with the same contents in freshly allocated storage.
    fn deep_clone(&self) -> Self;
}

/// Typed host buffer behind a [`DenseValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum DenseStorage {
    F16(Vec<half::f16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
}

macro_rules! with_storage {
    ($storage:expr, $v:ident => $body:expr) => {
        match $storage {
            DenseStorage::F16($v) => $body,
            DenseStorage::F32($v) => $body,
            DenseStorage::F64($v) => $body,
            DenseStorage::I8($v) => $body,
            DenseStorage::I16($v) => $body,
        }
    };
}

fn convert<T: WithDType>(data: &[f64]) -> Vec<T> {
    data.iter().map(|&x| T::from_f64(x)).collect()
}

fn widen<T: WithDType>(data: &[T]) -> Vec<f64> {
    data.iter().map(|&x| WithDType::to_f64(x)).collect()
}

fn fill_with<T: WithDType>(data: &mut [T], val: f64) {
    let x = T::from_f64(val);
    data.iter_mut().for_each(|e| *e = x);
}

impl DenseStorage {
    pub fn from_f64_slice(data: &[f64], dtype: DType) -> Self {
        match dtype {
            DType::F16 => DenseStorage::F16(convert(data)),
            DType::F32 => DenseStorage::F32(convert(data)),
            DType::F64 => DenseStorage::F64(data.to_vec()),
            DType::I8 => DenseStorage::I8(convert(data)),
            DType::I16 => DenseStorage::I16(convert(data)),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            DenseStorage::F16(_) => DType::F16,
            DenseStorage::F32(_) => DType::F32,
            DenseStorage::F64(_) => DType::F64,
            DenseStorage::I8(_) => DType::I8,
            DenseStorage::I16(_) => DType::I16,
        }
    }

    pub fn len(&self) -> usize {
        with_storage!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at a flat index, widened to f64.
    pub fn get(&self, index: usize) -> Option<f64> {
        with_storage!(self, v => v.get(index).map(|&x| WithDType::to_f64(x)))
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_storage!(self, v => widen(v))
    }

    fn fill(&mut self, val: f64) {
        with_storage!(self, v => fill_with(v, val))
    }

    fn set(&mut self, index: usize, val: f64) -> bool {
        with_storage!(self, v => match v.get_mut(index) {
            Some(slot) => {
                *slot = WithDType::from_f64(val);
                true
            }
            None => false,
        })
    }
}

/// A dense, row-major tensor value in host memory.
///
/// Cloning the handle is O(1) and shares storage; use
/// [`TensorValue::deep_clone`] for an independent copy.
#[derive(Debug, Clone)]
pub struct DenseValue {
    storage: Arc<RwLock<DenseStorage>>,
    shape: Shape,
    device: DeviceDescriptor,
}

impl DenseValue {
    /// Build a value from f64 data, converting to `dtype`.
    pub fn from_f64_slice(
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
        device: DeviceDescriptor,
    ) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.elem_count()?;
        if data.len() != expected {
            return Err(Error::ElementCountMismatch {
                shape,
                expected,
                got: data.len(),
            });
        }
        Ok(DenseValue {
            storage: Arc::new(RwLock::new(DenseStorage::from_f64_slice(data, dtype))),
            shape,
            device,
        })
    }

    pub fn full(
        shape: impl Into<Shape>,
        val: f64,
        dtype: DType,
        device: DeviceDescriptor,
    ) -> Result<Self> {
        let shape = shape.into();
        let data = vec![val; shape.elem_count()?];
        Self::from_f64_slice(&data, shape, dtype, device)
    }

    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: DeviceDescriptor) -> Result<Self> {
        Self::full(shape, 0.0, dtype, device)
    }

    pub fn elem_count(&self) -> usize {
        self.storage().len()
    }

    /// Contents widened to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.storage().to_f64_vec()
    }

    /// Element at a flat (row-major) index.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.storage().get(index)
    }

    /// Overwrite every element in place. All handles sharing this storage
    /// observe the write.
    pub fn fill(&self, val: f64) {
        self.storage_mut().fill(val);
    }

    /// Overwrite one element in place.
    pub fn set(&self, index: usize, val: f64) -> Result<()> {
        let len = self.elem_count();
        if !self.storage_mut().set(index, val) {
            return Err(Error::msg(format!(
                "index {index} out of range for value with {len} elements"
            )));
        }
        Ok(())
    }

    /// Whether two handles point at the same storage.
    pub fn same_storage(a: &DenseValue, b: &DenseValue) -> bool {
        Arc::ptr_eq(&a.storage, &b.storage)
    }

    pub fn storage(&self) -> std::sync::RwLockReadGuard<'_, DenseStorage> {
        self.storage.read().expect("storage lock poisoned")
    }

    fn storage_mut(&self) -> std::sync::RwLockWriteGuard<'_, DenseStorage> {
        self.storage.write().expect("storage lock poisoned")
    }
}

impl TensorValue for DenseValue {
    fn dtype(&self) -> DType {
        self.storage().dtype()
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn device(&self) -> DeviceDescriptor {
        self.device
    }

    fn deep_clone(&self) -> Self {
        let copy = (*self.storage()).clone();
        DenseValue {
            storage: Arc::new(RwLock::new(copy)),
            shape: self.shape.clone(),
            device: self.device,
        }
    }
}
