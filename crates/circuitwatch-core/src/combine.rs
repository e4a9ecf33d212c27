//! Combine-latest over two independent push sources.
//!
//! Holds the last value seen from each side plus a per-side "has emitted"
//! flag. A combined pair is produced only once both sides have emitted,
//! then on every subsequent update from either side.

/// Identifies one input slot of a [`CombineLatest2`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct CombineLatest2<A, B> {
    left: Option<A>,
    right: Option<B>,
    emitted: [bool; 2],
}

impl<A, B> Default for CombineLatest2<A, B> {
    fn default() -> Self {
        Self {
            left: None,
            right: None,
            emitted: [false; 2],
        }
    }
}

impl<A, B> CombineLatest2<A, B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new left value. Returns the combined snapshot when ready.
    pub fn push_left(&mut self, value: A) -> Option<(&A, &B)> {
        self.left = Some(value);
        self.emitted[0] = true;
        self.latest()
    }

    /// Record a new right value. Returns the combined snapshot when ready.
    pub fn push_right(&mut self, value: B) -> Option<(&A, &B)> {
        self.right = Some(value);
        self.emitted[1] = true;
        self.latest()
    }

    /// Current snapshot without recording anything (used for time-driven recomputes).
    pub fn latest(&self) -> Option<(&A, &B)> {
        match (&self.left, &self.right) {
            (Some(a), Some(b)) if self.is_ready() => Some((a, b)),
            _ => None,
        }
    }

    pub fn has_emitted(&self, side: Side) -> bool {
        match side {
            Side::Left => self.emitted[0],
            Side::Right => self.emitted[1],
        }
    }

    pub fn is_ready(&self) -> bool {
        self.emitted.iter().all(|e| *e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_for_both_sides() {
        let mut c: CombineLatest2<u32, Option<&str>> = CombineLatest2::new();
        assert!(c.push_left(1).is_none());
        assert!(c.push_left(2).is_none());
        assert!(c.has_emitted(Side::Left));
        assert!(!c.has_emitted(Side::Right));

        // A `None` payload still counts as an emission.
        let (a, b) = c.push_right(None).expect("ready");
        assert_eq!((*a, *b), (2, None));
    }

    #[test]
    fn emits_on_every_update_with_latest_other_side() {
        let mut c: CombineLatest2<u32, &str> = CombineLatest2::new();
        c.push_right("x");
        assert_eq!(c.push_left(1).map(|(a, b)| (*a, *b)), Some((1, "x")));
        assert_eq!(c.push_right("y").map(|(a, b)| (*a, *b)), Some((1, "y")));
        assert_eq!(c.push_left(5).map(|(a, b)| (*a, *b)), Some((5, "y")));
        assert_eq!(c.latest().map(|(a, b)| (*a, *b)), Some((5, "y")));
    }
}
