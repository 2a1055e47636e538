//! Splitting the watch list between workers.

/// Split `items` into `parts` contiguous, order-preserving groups.
///
/// Group sizes differ by at most one and the first `len % parts` groups get
/// the extra element. Always returns `parts` groups, some possibly empty.
pub fn split<T>(items: &[T], parts: usize) -> Vec<&[T]> {
    if parts == 0 {
        return Vec::new();
    }
    let base = items.len() / parts;
    let extra = items.len() % parts;

    let mut groups = Vec::with_capacity(parts);
    let mut start = 0;
    for index in 0..parts {
        let size = base + usize::from(index < extra);
        groups.push(&items[start..start + size]);
        start += size;
    }
    groups
}

/// The group of `items` owned by worker `index`.
pub fn group<T>(items: &[T], parts: usize, index: usize) -> &[T] {
    split(items, parts).get(index).copied().unwrap_or(&[])
}

/// A worker's position inside its group.
///
/// The group may change size between ticks; the cursor is validated against
/// the current size every time it advances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    position: Option<usize>,
}

/// Where an advanced cursor landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub index: usize,
    /// The cursor went back to the start of its group.
    pub wrapped: bool,
}

impl Cursor {
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Move to the next account of a group of `len` accounts.
    ///
    /// Returns `None` for an empty group; the cursor is left untouched.
    pub fn advance(&mut self, len: usize) -> Option<Step> {
        if len == 0 {
            return None;
        }
        let step = match self.position {
            None => Step {
                index: 0,
                wrapped: false,
            },
            Some(p) if p + 1 >= len => Step {
                index: 0,
                wrapped: true,
            },
            Some(p) => Step {
                index: p + 1,
                wrapped: false,
            },
        };
        self.position = Some(step.index);
        Some(step)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn test_split_sizes() {
        let items: Vec<u32> = (0..7).collect();
        let groups = split(&items, 3);
        assert_eq!(groups, vec![&[0, 1, 2][..], &[3, 4][..], &[5, 6][..]]);

        let groups = split(&items[..2], 3);
        assert_eq!(groups.iter().map(|g| g.len()).collect::<Vec<_>>(), vec![1, 1, 0]);

        assert!(split(&items, 0).is_empty());
        assert_eq!(group(&items, 3, 5), &[] as &[u32]);
    }

    #[test]
    fn test_split_is_total_cover() {
        for len in 0..40usize {
            let items: Vec<usize> = (0..len).collect();
            for parts in 1..6 {
                let groups = split(&items, parts);
                assert_eq!(groups.len(), parts);

                let flat: Vec<usize> = groups.iter().flat_map(|g| g.iter().copied()).collect();
                assert_eq!(flat, items, "order lost for len={len} parts={parts}");

                let unique: BTreeSet<_> = flat.iter().collect();
                assert_eq!(unique.len(), len);

                let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1);
                assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
            }
        }
    }

    #[test]
    fn test_cursor_walks_and_wraps() {
        let mut cursor = Cursor::default();
        let steps: Vec<Step> = (0..4).filter_map(|_| cursor.advance(3)).collect();
        assert_eq!(
            steps.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 0]
        );
        assert_eq!(
            steps.iter().map(|s| s.wrapped).collect::<Vec<_>>(),
            vec![false, false, false, true]
        );
    }

    #[test]
    fn test_cursor_survives_shrinking_group() {
        let mut cursor = Cursor::default();
        for _ in 0..5 {
            cursor.advance(6);
        }
        assert_eq!(cursor.position(), Some(4));

        let step = cursor.advance(3).unwrap();
        assert_eq!(step, Step { index: 0, wrapped: true });

        assert_eq!(cursor.advance(0), None);
        assert_eq!(cursor.position(), Some(0));
    }
}
