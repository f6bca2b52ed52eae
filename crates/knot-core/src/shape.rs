use std::fmt;

use crate::error::{Error, Result};

// Shape: static shape of a variable
//
// Unlike a tensor's shape, a variable's shape is declared before any data
// exists, so a dimension is not always a number yet:
//
//   Fixed(n)  - known size, rendered as `n`
//   Free      - bound only when data flows through the graph, rendered `*`
//   Inferred  - to be inferred from the inputs of the producing operator,
//               rendered `?`
//
// Only concrete shapes (all Fixed) can back a tensor value.
//
// Rendering joins dims with " x ": [2 x 3], [* x 128], [] for scalars.

/// A single dimension of a variable's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Fixed(usize),
    Free,
    Inferred,
}

impl Dim {
    pub fn is_fixed(&self) -> bool {
        matches!(self, Dim::Fixed(_))
    }

    /// The size, if known.
    pub fn size(&self) -> Option<usize> {
        match self {
            Dim::Fixed(n) => Some(*n),
            Dim::Free | Dim::Inferred => None,
        }
    }
}

impl From<usize> for Dim {
    fn from(n: usize) -> Self {
        Dim::Fixed(n)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{}", n),
            Dim::Free => f.write_str("*"),
            Dim::Inferred => f.write_str("?"),
        }
    }
}

/// Ordered dimensions of a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<Dim>);

impl Shape {
    pub fn new(dims: Vec<Dim>) -> Self {
        Shape(dims)
    }

    /// Scalar shape.
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    pub fn dims(&self) -> &[Dim] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// True when every dimension has a known size.
    pub fn is_concrete(&self) -> bool {
        self.0.iter().all(Dim::is_fixed)
    }

    pub fn has_free_dimension(&self) -> bool {
        self.0.contains(&Dim::Free)
    }

    pub fn has_inferred_dimension(&self) -> bool {
        self.0.contains(&Dim::Inferred)
    }

    /// Sizes of a concrete shape.
    pub fn concrete_dims(&self) -> Result<Vec<usize>> {
        self.0
            .iter()
            .map(|d| d.size())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::NotConcrete {
                shape: self.clone(),
            })
    }

    /// Number of elements of a concrete shape. A scalar has 1 element.
    pub fn elem_count(&self) -> Result<usize> {
        Ok(self.concrete_dims()?.iter().product())
    }

    /// Render with the dimensions listed last-to-first.
    pub fn render_reversed(&self) -> String {
        let dims: Vec<String> = self.0.iter().rev().map(Dim::to_string).collect();
        format!("[{}]", dims.join(" x "))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " x ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Shape::scalar()
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![Dim::Fixed(d)])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![Dim::Fixed(d0), Dim::Fixed(d1)])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![Dim::Fixed(d0), Dim::Fixed(d1), Dim::Fixed(d2)])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v.into_iter().map(Dim::Fixed).collect())
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.iter().copied().map(Dim::Fixed).collect())
    }
}

impl From<Vec<Dim>> for Shape {
    fn from(v: Vec<Dim>) -> Self {
        Shape(v)
    }
}
