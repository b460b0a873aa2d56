// Operator kernel registry boundary
//
// The bridging passes never decide which layout an operator wants. They ask
// a registry, which callers (and tests) supply as a trait object.

use crate::desc::{DataType, Format, TensorDesc};
use crate::graph::GraphNode;
use rustc_hash::{FxHashMap, FxHashSet};

/// What the kernel implementations accept, per operator
pub trait KernelRegistry {
    /// Descriptor input `input_index` of `node` must have, `None` when the
    /// input takes whatever it is given
    fn required_descriptor(&self, node: &GraphNode, input_index: usize) -> Option<TensorDesc>;

    /// Operators that accept any layout and only care about dtype
    fn is_format_agnostic(&self, op_type: &str) -> bool;

    /// Formats the operator supports when its shapes are not statically known
    fn unknown_shape_formats(&self, _op_type: &str) -> Vec<Format> {
        Vec::new()
    }

    /// Element types the operator supports when its shapes are not statically known
    fn unknown_shape_dtypes(&self, _op_type: &str) -> Vec<DataType> {
        Vec::new()
    }
}

impl<R: KernelRegistry + ?Sized> KernelRegistry for &R {
    fn required_descriptor(&self, node: &GraphNode, input_index: usize) -> Option<TensorDesc> {
        (**self).required_descriptor(node, input_index)
    }

    fn is_format_agnostic(&self, op_type: &str) -> bool {
        (**self).is_format_agnostic(op_type)
    }

    fn unknown_shape_formats(&self, op_type: &str) -> Vec<Format> {
        (**self).unknown_shape_formats(op_type)
    }

    fn unknown_shape_dtypes(&self, op_type: &str) -> Vec<DataType> {
        (**self).unknown_shape_dtypes(op_type)
    }
}

/// Table-driven registry
///
/// Requirements default to the input descriptors recorded on each node by
/// the upstream format selection; individual inputs can be overridden by
/// node name.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    format_agnostic: FxHashSet<String>,
    unknown_formats: FxHashMap<String, Vec<Format>>,
    unknown_dtypes: FxHashMap<String, Vec<DataType>>,
    overrides: FxHashMap<(String, usize), TensorDesc>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format_agnostic(mut self, op_type: impl Into<String>) -> Self {
        self.format_agnostic.insert(op_type.into());
        self
    }

    pub fn with_unknown_shape_formats(mut self, op_type: impl Into<String>, formats: Vec<Format>) -> Self {
        self.unknown_formats.insert(op_type.into(), formats);
        self
    }

    pub fn with_unknown_shape_dtypes(mut self, op_type: impl Into<String>, dtypes: Vec<DataType>) -> Self {
        self.unknown_dtypes.insert(op_type.into(), dtypes);
        self
    }

    /// Require `desc` on one input of the node called `node_name`
    pub fn with_requirement(mut self, node_name: impl Into<String>, input_index: usize, desc: TensorDesc) -> Self {
        self.overrides.insert((node_name.into(), input_index), desc);
        self
    }
}

impl KernelRegistry for StaticRegistry {
    fn required_descriptor(&self, node: &GraphNode, input_index: usize) -> Option<TensorDesc> {
        self.overrides
            .get(&(node.name.clone(), input_index))
            .or_else(|| node.input(input_index))
            .cloned()
    }

    fn is_format_agnostic(&self, op_type: &str) -> bool {
        self.format_agnostic.contains(op_type)
    }

    fn unknown_shape_formats(&self, op_type: &str) -> Vec<Format> {
        self.unknown_formats.get(op_type).cloned().unwrap_or_default()
    }

    fn unknown_shape_dtypes(&self, op_type: &str) -> Vec<DataType> {
        self.unknown_dtypes.get(op_type).cloned().unwrap_or_default()
    }
}
