use std::collections::VecDeque;

use crate::canvas::{Layer, LayerStack};
use crate::error::{EditorError, Result};
use crate::{log_info, log_warn};

/// Default number of undo entries kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Default memory cap across both stacks (512 MB).
pub const DEFAULT_HISTORY_MEMORY: usize = 512 * 1024 * 1024;

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// A point-in-time copy of the state an action is about to change.
///
/// Pixel-only actions capture the one layer they touch; structural actions
/// (add, delete, move, merge, resize, import) capture the
/// whole stack.
#[derive(Clone, Debug)]
pub enum HistorySnapshot {
    Layer { index: usize, layer: Layer },
    Stack(StackSnapshot),
}

#[derive(Clone, Debug)]
pub struct StackSnapshot {
    pub width: u32,
    pub height: u32,
    pub active_index: usize,
    pub layers: Vec<Layer>,
}

fn same_layer(a: &Layer, b: &Layer) -> bool {
    a.id == b.id && a.metadata() == b.metadata() && a.surface == b.surface
}

impl HistorySnapshot {
    pub fn capture_layer(stack: &LayerStack, index: usize) -> Result<Self> {
        let layer = stack.layer(index)?.try_clone()?;
        Ok(HistorySnapshot::Layer { index, layer })
    }

    pub fn capture_stack(stack: &LayerStack) -> Result<Self> {
        let mut layers = Vec::new();
        layers.try_reserve_exact(stack.len())?;
        for layer in stack.layers() {
            layers.push(layer.try_clone()?);
        }
        Ok(HistorySnapshot::Stack(StackSnapshot {
            width: stack.width(),
            height: stack.height(),
            active_index: stack.active_index(),
            layers,
        }))
    }

    /// Capture the current state at the same granularity as `self`.
    fn capture_counterpart(&self, stack: &LayerStack) -> Result<Self> {
        match self {
            HistorySnapshot::Layer { index, .. } => Self::capture_layer(stack, *index),
            HistorySnapshot::Stack(_) => Self::capture_stack(stack),
        }
    }

    /// True when restoring would leave `stack` exactly as it is.
    pub fn matches(&self, stack: &LayerStack) -> bool {
        match self {
            HistorySnapshot::Layer { index, layer } => stack
                .layers()
                .get(*index)
                .is_some_and(|current| same_layer(current, layer)),
            HistorySnapshot::Stack(snap) => {
                snap.width == stack.width()
                    && snap.height == stack.height()
                    && snap.active_index == stack.active_index()
                    && snap.layers.len() == stack.len()
                    && snap.layers.iter().zip(stack.layers()).all(|(a, b)| same_layer(a, b))
            }
        }
    }

    fn check_restorable(&self, stack: &LayerStack) -> Result<()> {
        match self {
            HistorySnapshot::Layer { index, layer } => {
                let current = stack.layer(*index)?;
                if current.id != layer.id {
                    return Err(EditorError::invalid("layer snapshot no longer matches the layer at its index"));
                }
                if current.surface.dimensions() != layer.surface.dimensions() {
                    return Err(EditorError::invalid("layer snapshot no longer matches the stack size"));
                }
                Ok(())
            }
            HistorySnapshot::Stack(snap) if snap.layers.is_empty() => {
                Err(EditorError::invalid("stack snapshot holds no layers"))
            }
            HistorySnapshot::Stack(_) => Ok(()),
        }
    }

    fn restore_into(self, stack: &mut LayerStack) -> Result<()> {
        self.check_restorable(stack)?;
        match self {
            HistorySnapshot::Layer { index, layer } => stack.replace_layer(index, layer),
            HistorySnapshot::Stack(snap) => {
                stack.restore(snap.layers, snap.active_index, snap.width, snap.height);
                Ok(())
            }
        }
    }

    pub fn memory_bytes(&self) -> usize {
        match self {
            HistorySnapshot::Layer { layer, .. } => layer.memory_bytes(),
            HistorySnapshot::Stack(snap) => snap.layers.iter().map(Layer::memory_bytes).sum(),
        }
    }
}

/// One undoable step: the state before an action plus a short label.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub description: String,
    pub snapshot: HistorySnapshot,
}

impl HistoryEntry {
    pub fn layer(description: impl Into<String>, stack: &LayerStack, index: usize) -> Result<Self> {
        Ok(Self {
            description: description.into(),
            snapshot: HistorySnapshot::capture_layer(stack, index)?,
        })
    }

    pub fn stack(description: impl Into<String>, stack: &LayerStack) -> Result<Self> {
        Ok(Self {
            description: description.into(),
            snapshot: HistorySnapshot::capture_stack(stack)?,
        })
    }

    fn memory_bytes(&self) -> usize {
        self.snapshot.memory_bytes() + self.description.len()
    }
}

// ============================================================================
// HISTORY MANAGER - Manages undo/redo stacks with count and memory limits
// ============================================================================

/// Linear undo/redo history.
///
/// Callers capture a [`HistoryEntry`] *before* mutating, then hand it to
/// [`push`](Self::push) (or [`push_if_changed`](Self::push_if_changed) once the
/// action is done).  Any push clears the redo stack.
#[derive(Debug)]
pub struct HistoryManager {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: VecDeque<HistoryEntry>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, Some(DEFAULT_HISTORY_MEMORY))
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize, max_memory_bytes: Option<usize>) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            max_memory_bytes,
            total_memory: 0,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        // A new action invalidates everything that was undone
        for old in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(old.memory_bytes());
        }

        self.total_memory += entry.memory_bytes();
        self.undo_stack.push_back(entry);

        self.prune();
    }

    /// Push `entry` only if the action actually changed what it captured.
    /// Returns whether an entry was recorded.
    pub fn push_if_changed(&mut self, entry: HistoryEntry, stack: &LayerStack) -> bool {
        if entry.snapshot.matches(stack) {
            return false;
        }
        self.push(entry);
        true
    }

    /// Capture the given layer and push it as a new entry.
    pub fn snapshot_layer(&mut self, stack: &LayerStack, index: usize, description: &str) -> Result<()> {
        let entry = HistoryEntry::layer(description, stack, index)?;
        self.push(entry);
        Ok(())
    }

    /// Capture the whole stack and push it as a new entry.
    pub fn snapshot_stack(&mut self, stack: &LayerStack, description: &str) -> Result<()> {
        let entry = HistoryEntry::stack(description, stack)?;
        self.push(entry);
        Ok(())
    }

    /// Restore the most recent entry.  Returns its description, or `None`
    /// when there is nothing to undo.
    pub fn undo(&mut self, stack: &mut LayerStack) -> Option<String> {
        let entry = self.undo_stack.pop_back()?;
        self.total_memory = self.total_memory.saturating_sub(entry.memory_bytes());
        match Self::swap_state(entry, stack) {
            Ok((description, counterpart)) => {
                self.stash(counterpart, false);
                Some(description)
            }
            Err((entry, e)) => {
                log_warn!("undo '{}' failed: {}", entry.description, e);
                self.total_memory += entry.memory_bytes();
                self.undo_stack.push_back(entry);
                None
            }
        }
    }

    /// Re-apply the most recently undone entry.
    pub fn redo(&mut self, stack: &mut LayerStack) -> Option<String> {
        let entry = self.redo_stack.pop_back()?;
        self.total_memory = self.total_memory.saturating_sub(entry.memory_bytes());
        match Self::swap_state(entry, stack) {
            Ok((description, counterpart)) => {
                self.stash(counterpart, true);
                Some(description)
            }
            Err((entry, e)) => {
                log_warn!("redo '{}' failed: {}", entry.description, e);
                self.total_memory += entry.memory_bytes();
                self.redo_stack.push_back(entry);
                None
            }
        }
    }

    /// Capture the current state at the entry's granularity, then restore the
    /// entry.  The counterpart is `None` when it could not be allocated.
    fn swap_state(
        entry: HistoryEntry,
        stack: &mut LayerStack,
    ) -> std::result::Result<(String, Option<HistoryEntry>), (HistoryEntry, EditorError)> {
        if let Err(e) = entry.snapshot.check_restorable(stack) {
            return Err((entry, e));
        }
        let counterpart = match entry.snapshot.capture_counterpart(stack) {
            Ok(snapshot) => Some(HistoryEntry {
                description: entry.description.clone(),
                snapshot,
            }),
            Err(e) => {
                log_warn!("history: could not keep the state for '{}': {}", entry.description, e);
                None
            }
        };
        let description = entry.description.clone();
        let HistoryEntry { snapshot, .. } = entry;
        if let Err(e) = snapshot.restore_into(stack) {
            // Unreachable after check_restorable; keep the label for the log
            log_warn!("history: restore of '{}' failed: {}", description, e);
        }
        Ok((description, counterpart))
    }

    /// Store the captured counterpart on the opposite stack.  Without one,
    /// that stack is dropped since its entries no longer chain.
    fn stash(&mut self, counterpart: Option<HistoryEntry>, onto_undo: bool) {
        let target = if onto_undo { &mut self.undo_stack } else { &mut self.redo_stack };
        match counterpart {
            Some(entry) => {
                self.total_memory += entry.memory_bytes();
                target.push_back(entry);
            }
            None => {
                let dropped: usize = target.drain(..).map(|e| e.memory_bytes()).sum();
                self.total_memory = self.total_memory.saturating_sub(dropped);
            }
        }
        self.prune();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.description.as_str())
    }

    /// All undo descriptions, most recent first.
    pub fn undo_descriptions(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|e| e.description.clone()).collect()
    }

    /// Bytes held by both stacks (cached, O(1)).
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn max_history_size(&self) -> usize {
        self.max_history_size
    }

    /// Drop the oldest undo entries until both limits hold.  The memory limit
    /// never evicts the newest entry.
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_bytes());
            }
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            let mut evicted = 0usize;
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_bytes());
                    evicted += 1;
                }
            }
            if evicted > 0 {
                log_info!("history: evicted {} entries to stay under {} bytes", evicted, max_bytes);
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MoveDirection;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn test_undo_redo_single_layer() {
        let mut stack = LayerStack::new(4, 4);
        let mut history = HistoryManager::default();
        let before = stack.composite(false);

        history.snapshot_layer(&stack, 0, "Fill").unwrap();
        stack.active_layer_mut().surface.fill(RED);
        let after = stack.composite(false);

        assert_eq!(history.undo(&mut stack).as_deref(), Some("Fill"));
        assert_eq!(stack.composite(false), before);
        assert!(history.can_redo());

        assert_eq!(history.redo(&mut stack).as_deref(), Some("Fill"));
        assert_eq!(stack.composite(false), after);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_undo_on_empty_returns_none() {
        let mut stack = LayerStack::new(2, 2);
        let mut history = HistoryManager::default();
        assert!(history.undo(&mut stack).is_none());
        assert!(history.redo(&mut stack).is_none());
    }

    #[test]
    fn test_push_clears_redo() {
        let mut stack = LayerStack::new(2, 2);
        let mut history = HistoryManager::default();
        history.snapshot_layer(&stack, 0, "A").unwrap();
        stack.active_layer_mut().surface.fill(RED);
        history.undo(&mut stack);
        assert_eq!(history.redo_count(), 1);
        history.snapshot_layer(&stack, 0, "B").unwrap();
        assert_eq!(history.redo_count(), 0);
        assert_eq!(history.undo_descriptions(), vec!["B".to_string()]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let stack = LayerStack::new(1, 1);
        let mut history = HistoryManager::new(3, None);
        for name in ["1", "2", "3", "4", "5"] {
            history.snapshot_layer(&stack, 0, name).unwrap();
        }
        assert_eq!(history.undo_count(), 3);
        assert_eq!(history.undo_descriptions(), vec!["5", "4", "3"]);
    }

    #[test]
    fn test_memory_cap_keeps_newest() {
        let stack = LayerStack::new(16, 16);
        // Smaller than a single snapshot
        let mut history = HistoryManager::new(10, Some(64));
        history.snapshot_layer(&stack, 0, "A").unwrap();
        history.snapshot_layer(&stack, 0, "B").unwrap();
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.undo_description(), Some("B"));
    }

    #[test]
    fn test_stack_snapshot_restores_structure() {
        let mut stack = LayerStack::new(3, 3);
        let mut history = HistoryManager::default();
        let original_id = stack.active_layer().id;
        history.snapshot_stack(&stack, "Add Layer").unwrap();
        stack.add_layer();
        assert_eq!(stack.len(), 2);

        history.undo(&mut stack);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.active_layer().id, original_id);

        history.redo(&mut stack);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.active_index(), 1);
    }

    #[test]
    fn test_push_if_changed_skips_noop() {
        let mut stack = LayerStack::new(3, 3);
        let mut history = HistoryManager::default();
        let entry = HistoryEntry::layer("Nothing", &stack, 0).unwrap();
        assert!(!history.push_if_changed(entry, &stack));
        assert!(!history.can_undo());

        let entry = HistoryEntry::layer("Paint", &stack, 0).unwrap();
        stack.active_layer_mut().surface.put_pixel(0, 0, RED);
        assert!(history.push_if_changed(entry, &stack));
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn test_layer_entry_refuses_a_different_layer() {
        let mut stack = LayerStack::new(2, 2);
        let bottom = stack.active_layer().id;
        let top = stack.add_layer();
        let mut history = HistoryManager::default();

        history.snapshot_layer(&stack, 0, "Fill").unwrap();
        stack.layer_mut(0).unwrap().surface.fill(RED);
        // Reordered without a history entry of its own
        stack.move_layer(bottom, MoveDirection::Up).unwrap();

        assert!(history.undo(&mut stack).is_none());
        assert_eq!(history.undo_count(), 1);
        let ids: Vec<_> = stack.layers().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![top, bottom]);
        assert_eq!(stack.layer_by_id(bottom).unwrap().surface.get_pixel(0, 0), Some(RED));
    }

    #[test]
    fn test_memory_usage_tracks_both_stacks() {
        let mut stack = LayerStack::new(4, 4);
        let mut history = HistoryManager::default();
        history.snapshot_layer(&stack, 0, "A").unwrap();
        let one = history.memory_usage();
        assert!(one >= 4 * 4 * 4);
        stack.active_layer_mut().surface.fill(RED);
        history.undo(&mut stack);
        assert_eq!(history.memory_usage(), one);
        history.clear();
        assert_eq!(history.memory_usage(), 0);
    }
}
