//! Local-slot allocation.
//!
//! Maps each variable to a [`ValueSource`]: either a dedicated frame slot or
//! a compile-time alias for the address of another variable's slot. Every
//! variable gets its own slot; no slot reuse across lifetimes yet.
//!
//! # Size model
//!
//! | Type | Bytes |
//! |---|---|
//! | `&T`, `&mut T` | 4 (one pointer) |
//! | `&str` | 8 (pointer + length) |
//! | `Option<T>` | 4 (tag) + size of `T` |
//! | `i32`, `bool` | 4 |
//! | `String` | 8 (pointer + length) |
//! | iterator | 8 (current + bound) |
//!
//! Anything else is rejected.

use std::collections::HashMap;
use std::fmt;

use rebar_types::{MAX_LOCALS, POINTER_SIZE, WORD_SIZE};

use crate::error::{CodegenError, CodegenResult};

/// Semantic type of a variable, as far as frame layout is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Boolean,
    /// Owned string: heap pointer + byte length.
    String,
    /// Unsized string slice; only meaningful behind a reference.
    StringSlice,
    Reference {
        referent: Box<DataType>,
        mutable: bool,
    },
    Option(Box<DataType>),
    /// Range iterator over `item`: `{ current: i32, bound: i32 }`.
    Iterator(Box<DataType>),
    Void,
    Tuple(Vec<DataType>),
    /// A user-defined struct or variant type.
    Named(String),
}

impl DataType {
    pub fn reference(referent: DataType) -> Self {
        DataType::Reference {
            referent: Box::new(referent),
            mutable: false,
        }
    }

    pub fn mutable_reference(referent: DataType) -> Self {
        DataType::Reference {
            referent: Box::new(referent),
            mutable: true,
        }
    }

    pub fn option(inner: DataType) -> Self {
        DataType::Option(Box::new(inner))
    }

    pub fn range_iterator() -> Self {
        DataType::Iterator(Box::new(DataType::Int32))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int32 => write!(f, "i32"),
            DataType::Boolean => write!(f, "bool"),
            DataType::String => write!(f, "String"),
            DataType::StringSlice => write!(f, "str"),
            DataType::Reference { referent, mutable } => {
                if *mutable {
                    write!(f, "&mut {referent}")
                } else {
                    write!(f, "&{referent}")
                }
            }
            DataType::Option(inner) => write!(f, "Option<{inner}>"),
            DataType::Iterator(item) => write!(f, "Iterator<{item}>"),
            DataType::Void => write!(f, "()"),
            DataType::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, ")")
            }
            DataType::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Byte size of a value of type `ty` in the frame.
pub fn type_size(ty: &DataType) -> CodegenResult<usize> {
    match ty {
        DataType::Reference { referent, .. } => {
            if **referent == DataType::StringSlice {
                Ok(POINTER_SIZE + WORD_SIZE)
            } else {
                Ok(POINTER_SIZE)
            }
        }
        DataType::Option(inner) => Ok(WORD_SIZE + type_size(inner)?),
        DataType::Int32 | DataType::Boolean => Ok(WORD_SIZE),
        DataType::String => Ok(POINTER_SIZE + WORD_SIZE),
        DataType::Iterator(_) => Ok(2 * WORD_SIZE),
        DataType::StringSlice | DataType::Void | DataType::Tuple(_) | DataType::Named(_) => {
            Err(CodegenError::UnsupportedType(ty.clone()))
        }
    }
}

/// Caller-assigned identity of a source-level variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub u32);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where a variable's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// A dedicated frame slot.
    LocalAllocation { index: u8, size: usize },
    /// The address of another variable's slot, known at compile time.
    ConstantLocalReference { referenced_index: u8 },
}

/// How a variable should be allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationKind {
    /// Give the variable its own slot sized for this type.
    Local(DataType),
    /// The variable is only ever the address of `referenced`.
    ConstantReference(VariableId),
}

/// One entry in an allocation request list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub id: VariableId,
    pub kind: AllocationKind,
}

impl Variable {
    pub fn local(id: VariableId, ty: DataType) -> Self {
        Self {
            id,
            kind: AllocationKind::Local(ty),
        }
    }

    pub fn constant_reference(id: VariableId, referenced: VariableId) -> Self {
        Self {
            id,
            kind: AllocationKind::ConstantReference(referenced),
        }
    }
}

/// Assigns frame slots to variables in the order they are presented.
#[derive(Debug, Default)]
pub struct Allocator {
    sources: HashMap<VariableId, ValueSource>,
    local_sizes: Vec<usize>,
}

impl Allocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate every variable in order, returning one value source each.
    pub fn allocate_all(
        &mut self,
        variables: impl IntoIterator<Item = Variable>,
    ) -> CodegenResult<Vec<ValueSource>> {
        variables
            .into_iter()
            .map(|variable| match variable.kind {
                AllocationKind::Local(ty) => self.allocate_local(variable.id, &ty),
                AllocationKind::ConstantReference(referenced) => {
                    self.allocate_constant_reference(variable.id, referenced)
                }
            })
            .collect()
    }

    /// Give `variable` the next free slot, sized for `ty`.
    pub fn allocate_local(&mut self, variable: VariableId, ty: &DataType) -> CodegenResult<ValueSource> {
        if self.sources.contains_key(&variable) {
            return Err(CodegenError::AlreadyAllocated(variable));
        }
        let size = type_size(ty)?;
        let index = u8::try_from(self.local_sizes.len()).map_err(|_| {
            CodegenError::LimitExceeded(format!("more than {MAX_LOCALS} locals"))
        })?;
        let source = ValueSource::LocalAllocation { index, size };
        tracing::trace!(%variable, %ty, index, size, "local allocated");
        self.local_sizes.push(size);
        self.sources.insert(variable, source);
        Ok(source)
    }

    /// Make `variable` an alias for the address of `referenced`'s slot.
    pub fn allocate_constant_reference(
        &mut self,
        variable: VariableId,
        referenced: VariableId,
    ) -> CodegenResult<ValueSource> {
        if self.sources.contains_key(&variable) {
            return Err(CodegenError::AlreadyAllocated(variable));
        }
        let referenced_index = match self.sources.get(&referenced) {
            Some(ValueSource::LocalAllocation { index, .. }) => *index,
            Some(ValueSource::ConstantLocalReference { .. }) => {
                return Err(CodegenError::NotAddressable(referenced));
            }
            None => return Err(CodegenError::UnallocatedVariable(referenced)),
        };
        let source = ValueSource::ConstantLocalReference { referenced_index };
        tracing::trace!(%variable, %referenced, referenced_index, "constant reference allocated");
        self.sources.insert(variable, source);
        Ok(source)
    }

    pub fn value_source(&self, variable: VariableId) -> Option<ValueSource> {
        self.sources.get(&variable).copied()
    }

    /// Slot sizes in slot-index order; feed to [`crate::FunctionBuilder::set_local_sizes`].
    pub fn local_sizes(&self) -> &[usize] {
        &self.local_sizes
    }
}
