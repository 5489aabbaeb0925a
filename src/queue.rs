//! Host frame queue
//!
//! Fixed ring of host frames waiting for a transmit buffer. An entry stays
//! reserved while its frame is in a transmit buffer, so the completion can
//! echo the frame the host actually sent.

use crate::frame::CanFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Free,
    Queued,
    InFlight,
}

/// Ring buffer of host frames with capacity `N`
///
/// `N` must equal the number of frames the host may have outstanding; the
/// bridge checks this against [`BridgeConfig::host_tx_window`](crate::BridgeConfig).
pub struct HostFrameQueue<const N: usize> {
    frames: [CanFrame; N],
    states: [EntryState; N],
    write_index: usize,
    read_index: usize,
    /// Queued plus in-flight entries
    count: usize,
}

impl<const N: usize> Default for HostFrameQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> HostFrameQueue<N> {
    pub const fn new() -> Self {
        Self {
            frames: [CanFrame::new(); N],
            states: [EntryState::Free; N],
            write_index: 0,
            read_index: 0,
            count: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Entries holding a frame, in flight or not
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// No more frames can be taken from the host right now
    pub fn is_full(&self) -> bool {
        self.count == N || self.states.get(self.write_index) != Some(&EntryState::Free)
    }

    /// Frames waiting for a transmit buffer
    pub fn pending(&self) -> usize {
        self.states
            .iter()
            .filter(|s| **s == EntryState::Queued)
            .count()
    }

    fn next(index: usize) -> usize {
        (index + 1) % N
    }

    /// Append a frame; `false` leaves the queue untouched
    pub fn try_push(&mut self, frame: CanFrame) -> bool {
        if self.is_full() {
            return false;
        }
        self.frames[self.write_index] = frame;
        self.states[self.write_index] = EntryState::Queued;
        self.write_index = Self::next(self.write_index);
        self.count += 1;
        true
    }

    /// Remove the oldest queued frame
    pub fn try_pop(&mut self) -> Option<CanFrame> {
        let index = self.claim()?;
        self.release(index)
    }

    /// Reserve the oldest queued frame for a transmit buffer
    ///
    /// Returns the entry index; the entry is kept until [`release`](Self::release).
    pub fn claim(&mut self) -> Option<usize> {
        if self.states.get(self.read_index) != Some(&EntryState::Queued) {
            return None;
        }
        let index = self.read_index;
        self.states[index] = EntryState::InFlight;
        self.read_index = Self::next(index);
        Some(index)
    }

    /// Hand the most recently claimed entry back to the head of the queue
    ///
    /// Only the last claim can be undone; `false` for any other entry.
    pub fn unclaim(&mut self, index: usize) -> bool {
        if N == 0 || (self.read_index + N - 1) % N != index {
            return false;
        }
        if self.states[index] != EntryState::InFlight {
            return false;
        }
        self.states[index] = EntryState::Queued;
        self.read_index = index;
        true
    }

    /// Frame stored in entry `index`
    pub fn get(&self, index: usize) -> Option<&CanFrame> {
        match self.states.get(index) {
            Some(EntryState::Free) | None => None,
            Some(_) => Some(&self.frames[index]),
        }
    }

    /// Free a claimed entry and hand back its frame
    pub fn release(&mut self, index: usize) -> Option<CanFrame> {
        if self.states.get(index) != Some(&EntryState::InFlight) {
            return None;
        }
        self.states[index] = EntryState::Free;
        self.count -= 1;
        Some(self.frames[index])
    }

    /// Drop every frame, queued or in flight
    pub fn clear(&mut self) {
        self.states = [EntryState::Free; N];
        self.write_index = 0;
        self.read_index = 0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(echo_id: u32) -> CanFrame {
        let mut frame = CanFrame::with_data(0x100 + echo_id, &[echo_id as u8]);
        frame.echo_id = echo_id;
        frame
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = HostFrameQueue::<4>::new();
        for id in 0..3 {
            assert!(queue.try_push(frame(id)));
        }
        assert_eq!(queue.try_pop().unwrap().echo_id, 0);
        assert!(queue.try_push(frame(3)));
        assert!(queue.try_push(frame(4)));
        for id in 1..5 {
            assert_eq!(queue.try_pop().unwrap().echo_id, id);
        }
        assert!(queue.try_pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_push_leaves_contents() {
        let mut queue = HostFrameQueue::<2>::new();
        assert!(queue.try_push(frame(1)));
        assert!(queue.try_push(frame(2)));
        assert!(queue.is_full());
        assert!(!queue.try_push(frame(3)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop().unwrap().echo_id, 1);
        assert_eq!(queue.try_pop().unwrap().echo_id, 2);
    }

    #[test]
    fn test_in_flight_entries_count() {
        let mut queue = HostFrameQueue::<2>::new();
        queue.try_push(frame(1));
        queue.try_push(frame(2));

        let first = queue.claim().unwrap();
        assert_eq!(queue.get(first).unwrap().echo_id, 1);
        assert_eq!(queue.pending(), 1);
        assert!(!queue.try_push(frame(3)));

        assert_eq!(queue.release(first).unwrap().echo_id, 1);
        assert!(queue.release(first).is_none());
        assert!(queue.try_push(frame(3)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_unclaim_requeues_at_head() {
        let mut queue = HostFrameQueue::<3>::new();
        queue.try_push(frame(1));
        queue.try_push(frame(2));

        let first = queue.claim().unwrap();
        let second = queue.claim().unwrap();
        assert!(!queue.unclaim(first));
        assert!(queue.unclaim(second));
        assert!(!queue.unclaim(second));
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.claim(), Some(second));
        assert_eq!(queue.get(second).unwrap().echo_id, 2);
        queue.release(first);
        queue.release(second);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_out_of_order_release_blocks_writer() {
        let mut queue = HostFrameQueue::<3>::new();
        for id in 0..3 {
            queue.try_push(frame(id));
        }
        let a = queue.claim().unwrap();
        let b = queue.claim().unwrap();
        queue.release(b);

        // the writer is back at entry `a`, which is still in a transmit buffer
        assert_eq!(queue.len(), 2);
        assert!(!queue.try_push(frame(9)));
        queue.release(a);
        assert!(queue.try_push(frame(9)));
    }

    #[test]
    fn test_capacity_invariant_under_interleaving() {
        let mut queue = HostFrameQueue::<10>::new();
        let mut in_flight = std::vec::Vec::new();
        let mut next_push = 0u32;
        let mut next_out = 0u32;
        let mut seed = 0x2545_F491u32;

        for _ in 0..10_000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            match (seed >> 16) % 3 {
                0 => {
                    let was_full = queue.is_full();
                    let before = queue.len();
                    if queue.try_push(frame(next_push)) {
                        next_push += 1;
                    } else {
                        assert!(was_full);
                        assert_eq!(queue.len(), before);
                    }
                }
                1 => {
                    if let Some(index) = queue.claim() {
                        assert_eq!(queue.get(index).unwrap().echo_id, next_out);
                        next_out += 1;
                        in_flight.push(index);
                    }
                }
                _ => {
                    if !in_flight.is_empty() {
                        let index = in_flight.remove(0);
                        assert!(queue.release(index).is_some());
                    }
                }
            }
            assert!(queue.len() <= queue.capacity());
            assert_eq!(queue.len(), queue.pending() + in_flight.len());
        }
    }

    #[test]
    fn test_clear() {
        let mut queue = HostFrameQueue::<3>::new();
        queue.try_push(frame(1));
        queue.claim();
        queue.try_push(frame(2));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.claim().is_none());
        assert!(queue.try_push(frame(5)));
        assert_eq!(queue.try_pop().unwrap().echo_id, 5);
    }
}
