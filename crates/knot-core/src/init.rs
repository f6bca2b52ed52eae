// init: Value initialization policies for Parameter and Constant variables
//
// A variable does not need its value at construction time. Instead a
// Parameter can carry a policy plus a target device and materialize its
// value the first time anyone reads it (see Variable::value).
//
// POLICIES:
//
//   Constant(v)             - all elements = v
//   Uniform { scale }       - U(-scale, scale)
//   Normal { scale }        - N(0, scale)
//   GlorotUniform { gain }  - U(-a, a), a = gain * sqrt(6 / (fan_in + fan_out))
//   GlorotNormal { gain }   - N(0, s), s = gain * sqrt(2 / (fan_in + fan_out))
//   HeUniform { gain }      - U(-a, a), a = gain * sqrt(3 / fan_in)
//   HeNormal { gain }       - N(0, s), s = gain / sqrt(fan_in)
//
// Random policies take an optional seed. With a seed the same policy always
// produces the same value, which is what lets a cloned Parameter that
// re-runs its policy end up with the same contents as its source.
//
// Any closure `Fn(&Shape, DType, DeviceDescriptor) -> Result<V>` is also an
// initializer, for storage engines other than DenseValue.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::device::DeviceDescriptor;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::value::DenseValue;

/// Produces a value for a variable of the given shape and type.
pub trait Initializer<V>: Send + Sync {
    fn initialize(&self, shape: &Shape, dtype: DType, device: DeviceDescriptor) -> Result<V>;
}

impl<V, F> Initializer<V> for F
where
    F: Fn(&Shape, DType, DeviceDescriptor) -> Result<V> + Send + Sync,
{
    fn initialize(&self, shape: &Shape, dtype: DType, device: DeviceDescriptor) -> Result<V> {
        self(shape, dtype, device)
    }
}

/// Built-in initialization policies producing [`DenseValue`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitPolicy {
    Constant(f64),
    Uniform { scale: f64, seed: Option<u64> },
    Normal { scale: f64, seed: Option<u64> },
    GlorotUniform { gain: f64, seed: Option<u64> },
    GlorotNormal { gain: f64, seed: Option<u64> },
    HeUniform { gain: f64, seed: Option<u64> },
    HeNormal { gain: f64, seed: Option<u64> },
}

impl InitPolicy {
    pub fn zeros() -> Self {
        InitPolicy::Constant(0.0)
    }

    pub fn glorot_uniform() -> Self {
        InitPolicy::GlorotUniform {
            gain: 1.0,
            seed: None,
        }
    }

    pub fn he_normal() -> Self {
        InitPolicy::HeNormal {
            gain: std::f64::consts::SQRT_2,
            seed: None,
        }
    }

    /// Same policy with a fixed seed. No effect on `Constant`.
    pub fn with_seed(self, seed: u64) -> Self {
        let s = Some(seed);
        match self {
            InitPolicy::Constant(v) => InitPolicy::Constant(v),
            InitPolicy::Uniform { scale, .. } => InitPolicy::Uniform { scale, seed: s },
            InitPolicy::Normal { scale, .. } => InitPolicy::Normal { scale, seed: s },
            InitPolicy::GlorotUniform { gain, .. } => InitPolicy::GlorotUniform { gain, seed: s },
            InitPolicy::GlorotNormal { gain, .. } => InitPolicy::GlorotNormal { gain, seed: s },
            InitPolicy::HeUniform { gain, .. } => InitPolicy::HeUniform { gain, seed: s },
            InitPolicy::HeNormal { gain, .. } => InitPolicy::HeNormal { gain, seed: s },
        }
    }

    fn seed(&self) -> Option<u64> {
        match *self {
            InitPolicy::Constant(_) => None,
            InitPolicy::Uniform { seed, .. }
            | InitPolicy::Normal { seed, .. }
            | InitPolicy::GlorotUniform { seed, .. }
            | InitPolicy::GlorotNormal { seed, .. }
            | InitPolicy::HeUniform { seed, .. }
            | InitPolicy::HeNormal { seed, .. } => seed,
        }
    }
}

/// (fan_in, fan_out) of a weight shape.
///
/// - 1-D: fan_in = fan_out = dims[0]
/// - 2-D: fan_in = dims[1], fan_out = dims[0]
/// - 3-D+: convolution layout [out, in, k...], both scaled by the kernel size
fn compute_fans(dims: &[usize]) -> (f64, f64) {
    match dims.len() {
        0 => (1.0, 1.0),
        1 => (dims[0] as f64, dims[0] as f64),
        2 => (dims[1] as f64, dims[0] as f64),
        _ => {
            let receptive_field: usize = dims[2..].iter().product();
            let fan_in = dims[1] as f64 * receptive_field as f64;
            let fan_out = dims[0] as f64 * receptive_field as f64;
            (fan_in, fan_out)
        }
    }
}

fn sample_uniform(rng: &mut StdRng, n: usize, bound: f64) -> Vec<f64> {
    if !bound.is_finite() || bound <= 0.0 {
        return vec![0.0; n];
    }
    (0..n).map(|_| rng.gen_range(-bound..bound)).collect()
}

fn sample_normal(rng: &mut StdRng, n: usize, std: f64) -> Result<Vec<f64>> {
    let normal = Normal::new(0.0, std)
        .map_err(|e| Error::msg(format!("invalid normal std {std}: {e}")))?;
    Ok((0..n).map(|_| normal.sample(rng)).collect())
}

impl Initializer<DenseValue> for InitPolicy {
    fn initialize(
        &self,
        shape: &Shape,
        dtype: DType,
        device: DeviceDescriptor,
    ) -> Result<DenseValue> {
        let dims = shape.concrete_dims()?;
        let n: usize = dims.iter().product();
        let (fan_in, fan_out) = compute_fans(&dims);
        let mut rng = match self.seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let data = match *self {
            InitPolicy::Constant(v) => vec![v; n],
            InitPolicy::Uniform { scale, .. } => sample_uniform(&mut rng, n, scale),
            InitPolicy::Normal { scale, .. } => sample_normal(&mut rng, n, scale)?,
            InitPolicy::GlorotUniform { gain, .. } => {
                let a = gain * (6.0 / (fan_in + fan_out)).sqrt();
                sample_uniform(&mut rng, n, a)
            }
            InitPolicy::GlorotNormal { gain, .. } => {
                let std = gain * (2.0 / (fan_in + fan_out)).sqrt();
                sample_normal(&mut rng, n, std)?
            }
            InitPolicy::HeUniform { gain, .. } => {
                let a = gain * (3.0 / fan_in).sqrt();
                sample_uniform(&mut rng, n, a)
            }
            InitPolicy::HeNormal { gain, .. } => {
                let std = gain / fan_in.sqrt();
                sample_normal(&mut rng, n, std)?
            }
        };
        DenseValue::from_f64_slice(&data, shape.clone(), dtype, device)
    }
}

/// A policy and the device its value should be materialized on.
///
/// Cloning shares the policy.
pub struct DeferredInit<V> {
    policy: Arc<dyn Initializer<V>>,
    device: DeviceDescriptor,
}

impl<V> Clone for DeferredInit<V> {
    fn clone(&self) -> Self {
        DeferredInit {
            policy: Arc::clone(&self.policy),
            device: self.device,
        }
    }
}

impl<V> fmt::Debug for DeferredInit<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredInit")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl<V> DeferredInit<V> {
    pub fn new(policy: Arc<dyn Initializer<V>>, device: DeviceDescriptor) -> Self {
        DeferredInit { policy, device }
    }

    pub fn device(&self) -> DeviceDescriptor {
        self.device
    }

    /// Whether two deferred inits share the same policy object.
    pub fn same_policy(&self, other: &DeferredInit<V>) -> bool {
        Arc::ptr_eq(&self.policy, &other.policy)
    }

    pub(crate) fn run(&self, shape: &Shape, dtype: DType) -> Result<V> {
        self.policy.initialize(shape, dtype, self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TensorValue;

    fn cpu() -> DeviceDescriptor {
        DeviceDescriptor::cpu()
    }

    #[test]
    fn test_constant() {
        let v = InitPolicy::Constant(0.5)
            .initialize(&Shape::from((2, 2)), DType::F64, cpu())
            .unwrap();
        assert_eq!(v.to_f64_vec(), vec![0.5; 4]);
        assert_eq!(v.dtype(), DType::F64);
    }

    #[test]
    fn test_seeded_policy_is_deterministic() {
        let p = InitPolicy::glorot_uniform().with_seed(7);
        let shape = Shape::from((4, 3));
        let a = p.initialize(&shape, DType::F64, cpu()).unwrap();
        let b = p.initialize(&shape, DType::F64, cpu()).unwrap();
        assert_eq!(a.to_f64_vec(), b.to_f64_vec());
    }

    #[test]
    fn test_glorot_bounds() {
        let shape = Shape::from((10, 20));
        let v = InitPolicy::glorot_uniform()
            .with_seed(1)
            .initialize(&shape, DType::F64, cpu())
            .unwrap();
        let a = (6.0f64 / 30.0).sqrt();
        assert!(v.to_f64_vec().iter().all(|x| x.abs() <= a));
    }

    #[test]
    fn test_he_normal_spread() {
        let shape = Shape::from((64, 256));
        let v = InitPolicy::he_normal()
            .with_seed(3)
            .initialize(&shape, DType::F64, cpu())
            .unwrap();
        let data = v.to_f64_vec();
        let mean = data.iter().sum::<f64>() / data.len() as f64;
        let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64;
        // expected variance 2 / 256
        assert!(mean.abs() < 0.01);
        assert!((var - 2.0 / 256.0).abs() < 0.002);
    }

    #[test]
    fn test_normal_negative_scale_rejected() {
        let p = InitPolicy::Normal {
            scale: -1.0,
            seed: Some(0),
        };
        let r = p.initialize(&Shape::from(4usize), DType::F32, cpu());
        assert!(matches!(r, Err(Error::Msg(m)) if m.contains("invalid normal std")));
    }

    #[test]
    fn test_seeded_normal_is_deterministic() {
        let p = InitPolicy::Normal {
            scale: 0.5,
            seed: Some(11),
        };
        let shape = Shape::from((3, 3));
        let a = p.initialize(&shape, DType::F64, cpu()).unwrap();
        let b = p.initialize(&shape, DType::F64, cpu()).unwrap();
        assert_eq!(a.to_f64_vec(), b.to_f64_vec());
        assert!(a.to_f64_vec().iter().any(|&x| x != 0.0));
    }

    #[test]
    fn test_free_dimension_rejected() {
        let shape = Shape::new(vec![crate::shape::Dim::Free, crate::shape::Dim::Fixed(3)]);
        assert!(InitPolicy::zeros().initialize(&shape, DType::F32, cpu()).is_err());
    }

    #[test]
    fn test_closure_initializer() {
        let init = |shape: &Shape, dtype: DType, device: DeviceDescriptor| {
            DenseValue::full(shape.clone(), 3.0, dtype, device)
        };
        let deferred: DeferredInit<DenseValue> = DeferredInit::new(Arc::new(init), cpu());
        let v = deferred.run(&Shape::from(2usize), DType::F32).unwrap();
        assert_eq!(v.to_f64_vec(), vec![3.0, 3.0]);
    }

    #[test]
    fn test_deferred_clone_shares_policy() {
        let d: DeferredInit<DenseValue> = DeferredInit::new(Arc::new(InitPolicy::zeros()), cpu());
        let e = d.clone();
        assert!(d.same_policy(&e));
        assert_eq!(e.device(), cpu());
    }
}
