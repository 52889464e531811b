//! Ownership roles of the two scanout buffers

use super::DisplayError;

pub const SLOT_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    /// Owned by the renderer
    Back,
    /// Flip requested, not yet on screen
    Queued,
    /// Being scanned out
    Front,
    /// Still on screen until the queued flip completes
    PendingRelease,
}

#[derive(Debug)]
pub struct BufferArena {
    roles: [BufferRole; SLOT_COUNT],
}

impl BufferArena {
    pub fn new() -> Self {
        Self {
            roles: [BufferRole::Back; SLOT_COUNT],
        }
    }

    pub fn role(&self, slot: usize) -> BufferRole {
        self.roles[slot]
    }

    /// First slot the renderer may draw into
    pub fn back(&self) -> Option<usize> {
        self.roles.iter().position(|&r| r == BufferRole::Back)
    }

    pub fn front(&self) -> Option<usize> {
        self.roles.iter().position(|&r| r == BufferRole::Front)
    }

    /// Number of flips requested but not yet completed
    pub fn outstanding(&self) -> usize {
        self.roles.iter().filter(|&&r| r == BufferRole::Queued).count()
    }

    /// Check that `slot` may be rendered into
    pub fn check_writable(&self, slot: usize) -> Result<(), DisplayError> {
        self.require(slot, BufferRole::Back, "render")
    }

    /// Initial modeset: `slot` goes straight to the screen
    pub fn show_immediately(&mut self, slot: usize) -> Result<(), DisplayError> {
        self.require(slot, BufferRole::Back, "show")?;
        if let Some(front) = self.front() {
            self.roles[front] = BufferRole::Back;
        }
        self.roles[slot] = BufferRole::Front;
        Ok(())
    }

    /// A flip to `slot` was accepted by the hardware
    pub fn queue(&mut self, slot: usize) -> Result<(), DisplayError> {
        self.require(slot, BufferRole::Back, "queue")?;
        if self.outstanding() > 0 {
            let queued = self.roles.iter().position(|&r| r == BufferRole::Queued).unwrap_or(slot);
            return Err(DisplayError::BufferState {
                slot: queued,
                role: BufferRole::Queued,
                action: "queue a second flip",
            });
        }

        if let Some(front) = self.front() {
            self.roles[front] = BufferRole::PendingRelease;
        }
        self.roles[slot] = BufferRole::Queued;
        Ok(())
    }

    /// The queued flip completed: rotate roles
    pub fn complete(&mut self) -> Result<usize, DisplayError> {
        let Some(queued) = self.roles.iter().position(|&r| r == BufferRole::Queued) else {
            return Err(DisplayError::BufferState {
                slot: 0,
                role: self.roles[0],
                action: "complete a flip that was never queued",
            });
        };

        for role in self.roles.iter_mut() {
            if *role == BufferRole::PendingRelease {
                *role = BufferRole::Back;
            }
        }
        self.roles[queued] = BufferRole::Front;
        Ok(queued)
    }

    fn require(&self, slot: usize, role: BufferRole, action: &'static str) -> Result<(), DisplayError> {
        let current = self.roles[slot];
        if current == role {
            Ok(())
        } else {
            Err(DisplayError::BufferState {
                slot,
                role: current,
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_rotation() {
        let mut arena = BufferArena::new();
        arena.show_immediately(0).unwrap();
        assert_eq!(arena.back(), Some(1));

        arena.queue(1).unwrap();
        assert_eq!(arena.role(0), BufferRole::PendingRelease);
        assert_eq!(arena.role(1), BufferRole::Queued);
        assert_eq!(arena.back(), None);
        assert_eq!(arena.outstanding(), 1);

        assert_eq!(arena.complete().unwrap(), 1);
        assert_eq!(arena.role(0), BufferRole::Back);
        assert_eq!(arena.role(1), BufferRole::Front);
        assert_eq!(arena.outstanding(), 0);
    }

    #[test]
    fn test_front_is_not_writable() {
        let mut arena = BufferArena::new();
        arena.show_immediately(0).unwrap();

        assert!(matches!(
            arena.check_writable(0),
            Err(DisplayError::BufferState {
                role: BufferRole::Front,
                ..
            })
        ));
        assert!(arena.check_writable(1).is_ok());
    }

    #[test]
    fn test_cannot_queue_front_or_pending() {
        let mut arena = BufferArena::new();
        arena.show_immediately(0).unwrap();
        assert!(arena.queue(0).is_err());

        arena.queue(1).unwrap();
        assert!(arena.queue(0).is_err());
        assert!(arena.check_writable(0).is_err());
    }

    #[test]
    fn test_complete_without_queue_fails() {
        let mut arena = BufferArena::new();
        assert!(arena.complete().is_err());
    }
}
