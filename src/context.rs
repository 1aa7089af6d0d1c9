use indexmap::IndexMap;

use crate::{
    call::Bindings,
    class::Instance,
    diagnostics::{Diagnostic, Result},
};

/// Handle to a frame in [`Contexts`]. The generation guards against a
/// reclaimed slot being mistaken for the frame that used to live there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    /// The frame owns a return slot.
    Function,
}

#[derive(Debug)]
struct Frame {
    bindings: IndexMap<String, Instance>,
    parent: Option<ContextId>,
    special: Option<Special>,
    return_slot: Option<Instance>,
    refs: usize,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    frame: Option<Frame>,
}

/// Arena of scope frames linked by parent ids.
///
/// A child holds a reference on its parent, so a parent always outlives its
/// children, and a frame is reclaimed once its last holder releases it.
#[derive(Debug)]
pub struct Contexts {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: ContextId,
}

impl Default for Contexts {
    fn default() -> Self {
        Self::new()
    }
}

impl Contexts {
    pub fn new() -> Self {
        let mut contexts = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: ContextId {
                index: 0,
                generation: 0,
            },
        };
        contexts.root = contexts.allocate(Frame {
            bindings: IndexMap::new(),
            parent: None,
            special: None,
            return_slot: None,
            refs: 1,
        });
        contexts
    }

    pub fn root(&self) -> ContextId {
        self.root
    }

    fn allocate(&mut self, frame: Frame) -> ContextId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.frame = Some(frame);
            return ContextId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            frame: Some(frame),
        });
        ContextId {
            index,
            generation: 0,
        }
    }

    fn frame(&self, id: ContextId) -> Result<&Frame> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.frame.as_ref())
            .ok_or_else(|| stale(id))
    }

    fn frame_mut(&mut self, id: ContextId) -> Result<&mut Frame> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.frame.as_mut())
            .ok_or_else(|| stale(id))
    }

    /// Creates a child of `parent`. The caller owns the returned handle and
    /// must [`release`](Self::release) it.
    pub fn push(&mut self, parent: ContextId, special: Option<Special>) -> Result<ContextId> {
        self.retain(parent)?;
        Ok(self.allocate(Frame {
            bindings: IndexMap::new(),
            parent: Some(parent),
            special,
            return_slot: None,
            refs: 1,
        }))
    }

    /// Creates a function frame seeded with bound arguments.
    pub fn push_function(&mut self, parent: ContextId, bindings: Bindings) -> Result<ContextId> {
        let id = self.push(parent, Some(Special::Function))?;
        self.frame_mut(id)?.bindings = bindings;
        Ok(id)
    }

    pub fn retain(&mut self, id: ContextId) -> Result<()> {
        self.frame_mut(id)?.refs += 1;
        Ok(())
    }

    pub fn release(&mut self, id: ContextId) -> Result<()> {
        let mut next = Some(id);
        while let Some(id) = next.take() {
            let frame = self.frame_mut(id)?;
            frame.refs -= 1;
            if frame.refs > 0 {
                break;
            }
            next = frame.parent;
            let slot = &mut self.slots[id.index as usize];
            slot.frame = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
        }
        Ok(())
    }

    pub fn is_live(&self, id: ContextId) -> bool {
        self.frame(id).is_ok()
    }

    /// Number of frames currently allocated, the root included.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.frame.is_some()).count()
    }

    pub fn parent(&self, id: ContextId) -> Result<Option<ContextId>> {
        Ok(self.frame(id)?.parent)
    }

    pub fn special(&self, id: ContextId) -> Result<Option<Special>> {
        Ok(self.frame(id)?.special)
    }

    /// Looks `name` up through the parent chain.
    pub fn get_var(&self, id: ContextId, name: &str) -> Result<Instance> {
        let mut current = Some(id);
        while let Some(id) = current {
            let frame = self.frame(id)?;
            if let Some(value) = frame.bindings.get(name) {
                return Ok(value.clone());
            }
            current = frame.parent;
        }
        Err(Diagnostic::binding(format!("unknown variable `{name}`")).into())
    }

    /// Binds `name` in this frame, shadowing any outer binding.
    pub fn set_var(
        &mut self,
        id: ContextId,
        name: impl Into<String>,
        value: Instance,
    ) -> Result<()> {
        self.frame_mut(id)?.bindings.insert(name.into(), value);
        Ok(())
    }

    /// Updates the nearest existing binding of `name`, searching no further
    /// than the enclosing function frame; binds in `id` when none exists.
    pub fn assign(&mut self, id: ContextId, name: &str, value: Instance) -> Result<()> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            let frame = self.frame(candidate)?;
            if frame.bindings.contains_key(name) {
                return self.set_var(candidate, name, value);
            }
            if frame.special == Some(Special::Function) {
                break;
            }
            current = frame.parent;
        }
        self.set_var(id, name, value)
    }

    pub fn bindings(&self, id: ContextId) -> Result<&IndexMap<String, Instance>> {
        Ok(&self.frame(id)?.bindings)
    }

    /// Nearest frame marked [`Special::Function`], starting at `id`.
    pub fn function_frame(&self, id: ContextId) -> Result<Option<ContextId>> {
        let mut current = Some(id);
        while let Some(id) = current {
            let frame = self.frame(id)?;
            if frame.special == Some(Special::Function) {
                return Ok(Some(id));
            }
            current = frame.parent;
        }
        Ok(None)
    }

    pub fn set_return(&mut self, id: ContextId, value: Instance) -> Result<()> {
        let frame = self
            .function_frame(id)?
            .ok_or_else(|| Diagnostic::runtime("`return` outside of a function"))?;
        self.frame_mut(frame)?.return_slot = Some(value);
        Ok(())
    }

    pub fn has_returned(&self, frame: ContextId) -> bool {
        self.frame(frame)
            .map(|frame| frame.return_slot.is_some())
            .unwrap_or(false)
    }

    pub fn take_return(&mut self, frame: ContextId) -> Result<Option<Instance>> {
        Ok(self.frame_mut(frame)?.return_slot.take())
    }
}

fn stale(id: ContextId) -> crate::diagnostics::RillError {
    Diagnostic::runtime(format!("context #{} is no longer live", id.index)).into()
}
