use crate::alloc::string::{String, ToString};
use crate::alloc::vec::Vec;
use crate::errors::{check_dim, ResidualError};
use crate::linalg::{DVector, DVectorView, DVectorViewMut};

/// One named group of scalars inside a stacked state vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub dim: usize,
    pub offset: usize,
}

/// Ordered list of named elements describing how a state block is stacked into
/// a single vector. Offsets are fixed when the layout is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    elements: Vec<Element>,
    dim: usize,
}

#[derive(Debug, Default)]
pub struct LayoutBuilder {
    elements: Vec<(String, usize)>,
}

impl LayoutBuilder {
    /// append an element of `dim` scalars
    pub fn element(mut self, name: impl Into<String>, dim: usize) -> Self {
        self.elements.push((name.into(), dim));
        self
    }

    pub fn build(self) -> Result<Layout, ResidualError> {
        let mut elements: Vec<Element> = Vec::with_capacity(self.elements.len());
        let mut offset = 0;
        for (name, dim) in self.elements {
            if elements.iter().any(|e| e.name == name) {
                return Err(ResidualError::DuplicateElement(name));
            }
            elements.push(Element { name, dim, offset });
            offset += dim;
        }
        Ok(Layout {
            elements,
            dim: offset,
        })
    }
}

impl Layout {
    pub fn builder() -> LayoutBuilder {
        LayoutBuilder::default()
    }

    /// total number of scalars
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn element(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// `(offset, dim)` of the element at `index`
    pub fn span(&self, index: usize) -> Result<(usize, usize), ResidualError> {
        self.elements
            .get(index)
            .map(|e| (e.offset, e.dim))
            .ok_or(ResidualError::ElementIndexOutOfRange {
                index,
                count: self.elements.len(),
            })
    }

    pub fn index_of(&self, name: &str) -> Result<usize, ResidualError> {
        self.elements
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| ResidualError::UnknownElement(name.to_string()))
    }

    pub fn offset_of(&self, name: &str) -> Result<usize, ResidualError> {
        self.index_of(name).map(|i| self.elements[i].offset)
    }

    pub fn dim_of(&self, name: &str) -> Result<usize, ResidualError> {
        self.index_of(name).map(|i| self.elements[i].dim)
    }

    pub fn zeros(&self) -> DVector<f64> {
        DVector::zeros(self.dim)
    }

    /// Checks that a stacked vector matches this layout.
    pub fn check(&self, what: &'static str, v: &DVector<f64>) -> Result<(), ResidualError> {
        check_dim(what, self.dim, v.len())
    }

    /// view of the element at `index` inside a stacked vector
    pub fn view<'a>(
        &self,
        v: &'a DVector<f64>,
        index: usize,
    ) -> Result<DVectorView<'a, f64>, ResidualError> {
        self.check("stacked vector", v)?;
        let (offset, dim) = self.span(index)?;
        Ok(v.rows(offset, dim))
    }

    pub fn view_mut<'a>(
        &self,
        v: &'a mut DVector<f64>,
        index: usize,
    ) -> Result<DVectorViewMut<'a, f64>, ResidualError> {
        self.check("stacked vector", v)?;
        let (offset, dim) = self.span(index)?;
        Ok(v.rows_mut(offset, dim))
    }
}
