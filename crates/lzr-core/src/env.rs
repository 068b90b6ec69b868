//! Environments live in an arena addressed by generation-checked indices, so
//! promises and closures can refer to frames without forming `Rc` cycles.
//! Unreachable frames are reclaimed by [`Heap::collect`].

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::value::{Symbol, Value, VectorData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId {
    index: u32,
    generation: u32,
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug)]
pub struct Frame {
    parent: Option<EnvId>,
    bindings: HashMap<Symbol, Value>,
    version: u64,
    label: Option<Symbol>,
}

impl Frame {
    pub fn parent(&self) -> Option<EnvId> {
        self.parent
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bumped on every binding change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn label(&self) -> Option<&Symbol> {
        self.label.as_ref()
    }

    pub fn names(&self) -> Vec<Symbol> {
        let mut names: Vec<Symbol> = self.bindings.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    frame: Option<Frame>,
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    function_epoch: u64,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, parent: Option<EnvId>, label: Option<Symbol>) -> EnvId {
        let frame = Frame {
            parent,
            bindings: HashMap::new(),
            version: 0,
            label,
        };
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.frame = Some(frame);
                EnvId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    frame: Some(frame),
                });
                EnvId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    pub fn contains(&self, id: EnvId) -> bool {
        self.frame(id).is_ok()
    }

    pub fn frame(&self, id: EnvId) -> Result<&Frame> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.frame.as_ref())
            .ok_or_else(|| Error::internal(format!("environment {} has been collected", id)))
    }

    fn frame_mut(&mut self, id: EnvId) -> Result<&mut Frame> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.frame.as_mut())
            .ok_or_else(|| Error::internal(format!("environment {} has been collected", id)))
    }

    pub fn parent(&self, id: EnvId) -> Result<Option<EnvId>> {
        Ok(self.frame(id)?.parent)
    }

    pub fn get_local(&self, id: EnvId, name: &str) -> Result<Option<Value>> {
        Ok(self.frame(id)?.get(name).cloned())
    }

    /// Walks the parent chain from `id`, returning the binding and the frame holding it.
    pub fn lookup(&self, id: EnvId, name: &str) -> Result<Option<(EnvId, Value)>> {
        let mut current = Some(id);
        while let Some(env) = current {
            let frame = self.frame(env)?;
            if let Some(value) = frame.get(name) {
                return Ok(Some((env, value.clone())));
            }
            current = frame.parent;
        }
        Ok(None)
    }

    pub fn define(&mut self, id: EnvId, name: Symbol, value: Value) -> Result<()> {
        let defines_function = value.is_function();
        let frame = self.frame_mut(id)?;
        let previous = frame.bindings.insert(name, value);
        frame.version += 1;
        if defines_function || previous.is_some_and(|v| v.is_function()) {
            self.function_epoch += 1;
        }
        Ok(())
    }

    pub fn remove(&mut self, id: EnvId, name: &str) -> Result<Option<Value>> {
        let frame = self.frame_mut(id)?;
        let previous = frame.bindings.remove(name);
        if previous.is_some() {
            frame.version += 1;
        }
        if previous.as_ref().is_some_and(Value::is_function) {
            self.function_epoch += 1;
        }
        Ok(previous)
    }

    /// `<<-`: rebinds the nearest existing binding above `id`, or defines it in
    /// the outermost frame.
    pub fn assign_super(&mut self, id: EnvId, name: Symbol, value: Value) -> Result<EnvId> {
        let mut target = self.parent(id)?.unwrap_or(id);
        let mut current = Some(target);
        while let Some(env) = current {
            let frame = self.frame(env)?;
            target = env;
            if frame.contains(&name) {
                break;
            }
            current = frame.parent;
        }
        self.define(target, name, value)?;
        Ok(target)
    }

    /// Versions of every frame on the lookup chain starting at `id`.
    pub fn version_snapshot(&self, id: EnvId) -> Result<Vec<(EnvId, u64)>> {
        let mut snapshot = Vec::new();
        let mut current = Some(id);
        while let Some(env) = current {
            let frame = self.frame(env)?;
            snapshot.push((env, frame.version));
            current = frame.parent;
        }
        Ok(snapshot)
    }

    pub fn snapshot_is_current(&self, snapshot: &[(EnvId, u64)]) -> bool {
        snapshot.iter().all(|(env, version)| {
            self.frame(*env)
                .map(|frame| frame.version == *version)
                .unwrap_or(false)
        })
    }

    /// Bumped whenever a function is bound or unbound anywhere. Keys method caches.
    pub fn function_epoch(&self) -> u64 {
        self.function_epoch
    }

    pub fn live_frames(&self) -> usize {
        self.slots.iter().filter(|slot| slot.frame.is_some()).count()
    }

    /// Mark-sweep: frees every frame not reachable from `roots` or from the
    /// environments referenced by `values`. Returns how many frames were freed.
    ///
    /// Must only run between top-level evaluations, when no call record is live.
    pub fn collect<'a>(
        &mut self,
        roots: impl IntoIterator<Item = EnvId>,
        values: impl IntoIterator<Item = &'a Value>,
    ) -> usize {
        let mut marked = vec![false; self.slots.len()];
        let mut pending: Vec<EnvId> = roots.into_iter().collect();
        for value in values {
            trace_value(value, &mut pending);
        }

        while let Some(env) = pending.pop() {
            let Ok(frame) = self.frame(env) else {
                continue;
            };
            let index = env.index as usize;
            if marked[index] {
                continue;
            }
            marked[index] = true;
            pending.extend(frame.parent);
            for value in frame.bindings.values() {
                trace_value(value, &mut pending);
            }
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.frame.is_some() && !marked[index] {
                slot.frame = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                freed += 1;
            }
        }
        if freed > 0 {
            // cached methods may reference freed closures
            self.function_epoch += 1;
        }
        crate::debug!(freed, live = self.live_frames(), "collected environments");
        freed
    }
}

fn trace_value(value: &Value, pending: &mut Vec<EnvId>) {
    match value {
        Value::Env(id) => pending.push(*id),
        Value::Closure(closure) => pending.push(closure.env),
        Value::Promise(promise) => {
            pending.extend(promise.env());
            if let Some(value) = promise.value() {
                trace_value(&value, pending);
            }
            if let Some(eager) = promise.eager() {
                trace_value(&eager.value, pending);
            }
        }
        Value::Dots(dots) => dots.values.iter().for_each(|v| trace_value(v, pending)),
        Value::Vector(vector) => {
            if let VectorData::List(items) = &*vector.data() {
                items.iter().for_each(|v| trace_value(v, pending));
            }
            vector
                .attributes()
                .iter()
                .for_each(|(_, v)| trace_value(v, pending));
        }
        Value::Null | Value::Missing | Value::Builtin(_) | Value::Language(_) => {}
    }
}
