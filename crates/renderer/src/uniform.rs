use tracing::debug;

use crate::program::UniformLayout;

/// Destination for uniform writes.
///
/// The GPU implementation writes straight into the uniform buffer through the
/// queue; tests record the writes instead.
pub trait UniformTarget {
    /// Writes `data` at `offset` bytes into the uniform block.
    fn write(&self, offset: u64, data: &[u8]);
}

/// Binds one named float uniform of arity `N` to a target.
///
/// The location (byte offset inside the uniform block) is resolved once at
/// construction. Names the program does not declare, or declare with a
/// different component count, resolve to no location and every `set` on
/// them is ignored.
pub struct Uniform<const N: usize, T> {
    name: String,
    location: Option<u64>,
    target: T,
}

pub type Uniform4f<T> = Uniform<4, T>;
pub type Uniform2f<T> = Uniform<2, T>;
pub type Uniform1f<T> = Uniform<1, T>;

impl<const N: usize, T: UniformTarget> Uniform<N, T> {
    pub fn new(name: &str, layout: &UniformLayout, target: T) -> Self {
        let location = match layout.member(name) {
            Some(slot) if slot.components == N => Some(slot.offset),
            Some(slot) => {
                debug!(
                    uniform = name,
                    declared = slot.components,
                    requested = N,
                    "uniform arity mismatch; binder left unresolved"
                );
                None
            }
            None => {
                debug!(uniform = name, "uniform not declared by program");
                None
            }
        };
        Self {
            name: name.to_string(),
            location,
            target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Option<u64> {
        self.location
    }

    pub fn set(&self, values: [f32; N]) {
        if let Some(offset) = self.location {
            self.target
                .write(offset, bytemuck::cast_slice(values.as_slice()));
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use super::UniformTarget;

    /// Keeps the last value written at each offset.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingTarget {
        writes: Rc<RefCell<BTreeMap<u64, Vec<f32>>>>,
        count: Rc<RefCell<usize>>,
    }

    impl RecordingTarget {
        pub(crate) fn value_at(&self, offset: u64) -> Option<Vec<f32>> {
            self.writes.borrow().get(&offset).cloned()
        }

        pub(crate) fn write_count(&self) -> usize {
            *self.count.borrow()
        }
    }

    impl UniformTarget for RecordingTarget {
        fn write(&self, offset: u64, data: &[u8]) {
            let floats = data
                .chunks_exact(4)
                .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();
            self.writes.borrow_mut().insert(offset, floats);
            *self.count.borrow_mut() += 1;
        }
    }
}
