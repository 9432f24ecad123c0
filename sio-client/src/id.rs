//! Message id allocation

use sio_common::MessageId;

/// Monotonic id source for calls expecting acknowledgement.
///
/// One allocator per session; ids start at 1 and never yield 0, which is
/// reserved for "no id".
#[derive(Debug)]
pub struct MessageIdAllocator {
    next: MessageId,
}

impl Default for MessageIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> MessageId {
        let id = self.next;
        self.next = self.next.wrapping_add(1).max(1);
        id
    }
}
