//! # knot-core
//!
//! Variable nodes for the knot computation graph.
//!
//! A [`Variable`] is a single point of data flow: a graph input, an
//! operator output, a trainable parameter, a constant or a placeholder. This
//! crate owns its data model and the rules that every graph operation relies
//! on:
//! - identity: every node has a unique uid and [`NodeId`]; names are display only
//! - ownership: handles share the node through `Arc`; the producing operator
//!   is recorded as a non-owning [`FunctionId`]
//! - lazy initialization: a [`DeferredInit`] materializes a parameter's value
//!   exactly once, on first read, even under concurrent readers
//! - cloning: [`Variable::clone_node`] yields an independent node with a deep
//!   copy of the value
//!
//! Collaborator contracts and the implementations shipped with the crate:
//! - [`TensorValue`] / [`DenseValue`]: bound tensor storage
//! - [`Initializer`] / [`InitPolicy`]: value initialization policies
//! - [`Shape`] / [`Dim`], [`Axis`], [`DeviceDescriptor`], [`DType`]
//! - [`config`]: the process-wide rendering flag

pub mod axis;
pub mod config;
pub mod device;
pub mod dtype;
pub mod error;
pub mod init;
pub mod shape;
pub mod uid;
pub mod value;
pub mod variable;

pub use axis::Axis;
pub use config::RenderConfig;
pub use device::DeviceDescriptor;
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use init::{DeferredInit, InitPolicy, Initializer};
pub use shape::{Dim, Shape};
pub use uid::generate_uid;
pub use value::{DenseStorage, DenseValue, TensorValue};
pub use variable::{FunctionId, NodeId, Variable, VariableBuilder, VariableKind, VariableSpec};
