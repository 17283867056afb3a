//! Boolean and positional operations over sorted uid lists. All inputs
//! and outputs are strictly ascending; an empty list is an empty result,
//! so an unknown term collapses any AND chain to empty.

/// Sorted intersection. The larger list runs the outer pointer, keeping
/// the branch predictor on the side most likely to advance.
pub fn intersect_ids(n: &[u32], m: &[u32]) -> Vec<u32> {
    let (n, m) = if n.len() < m.len() { (m, n) } else { (n, m) };

    if m.is_empty() {
        return Vec::new();
    }

    let mut res = Vec::with_capacity(m.len());
    let (mut i, mut j) = (0, 0);

    while i < n.len() && j < m.len() {
        if n[i] < m[j] {
            i += 1;
        } else if n[i] > m[j] {
            j += 1;
        } else {
            res.push(n[i]);
            i += 1;
            j += 1;
        }
    }

    res
}

/// Sorted union: a merge over two ascending lists
pub fn combine_ids(n: &[u32], m: &[u32]) -> Vec<u32> {
    let mut res = Vec::with_capacity(n.len() + m.len());
    let (mut i, mut j) = (0, 0);

    while i < n.len() && j < m.len() {
        if n[i] < m[j] {
            res.push(n[i]);
            i += 1;
        } else if n[i] > m[j] {
            res.push(m[j]);
            j += 1;
        } else {
            res.push(n[i]);
            i += 1;
            j += 1;
        }
    }
    res.extend_from_slice(&n[i..]);
    res.extend_from_slice(&m[j..]);

    res
}

/// Sorted difference: items of the left stream absent from the right
pub fn exclude_ids(n: &[u32], m: &[u32]) -> Vec<u32> {
    if m.is_empty() {
        return n.to_vec();
    }

    let mut res = Vec::with_capacity(n.len());
    let (mut i, mut j) = (0, 0);

    while i < n.len() {
        if j == m.len() || n[i] < m[j] {
            res.push(n[i]);
            i += 1;
        } else if n[i] > m[j] {
            j += 1;
        } else {
            i += 1;
            j += 1;
        }
    }

    res
}

/// Keep positions of a growing phrase whose next word sits exactly
/// `delta` words after the phrase start; the stored position stays on
/// the phrase's first word
pub fn phrase_positions(pn: &[i16], pm: &[i16], delta: i16) -> Vec<i16> {
    let mut arry = Vec::new();
    let (mut q, mut r) = (0, 0);

    while q < pn.len() && r < pm.len() {
        let vn = pn[q];
        let vm = pm[r];
        let vnd = vn + delta;

        if vnd > vm {
            r += 1;
        } else if vnd < vm {
            q += 1;
        } else {
            arry.push(vn);
            q += 1;
            r += 1;
        }
    }

    arry
}

/// Proximity form: the following phrase may start anywhere after the
/// previous phrase up to `delta` words along; the stored position moves
/// to the following phrase for possible further chaining
pub fn proximity_positions(pn: &[i16], pm: &[i16], delta: i16) -> Vec<i16> {
    let mut arry = Vec::new();
    let (mut q, mut r) = (0, 0);

    while q < pn.len() && r < pm.len() {
        let vn = pn[q];
        let vm = pm[r];
        let vnd = vn + delta;

        if vnd < vm {
            q += 1;
        } else if vn < vm {
            arry.push(vm);
            q += 1;
            r += 1;
        } else {
            r += 1;
        }
    }

    arry
}

/// Positional intersection: keep uids present in both lists whose
/// position arrays satisfy the adjacency or proximity test. Order
/// matters when extending a phrase, so the lists are never swapped.
pub fn extend_positional_ids(
    n: &[u32],
    np: &[Vec<i16>],
    m: &[u32],
    mp: &[Vec<i16>],
    delta: i32,
    proc: fn(&[i16], &[i16], i16) -> Vec<i16>,
) -> (Vec<u32>, Vec<Vec<i16>>) {
    if n.is_empty() || np.is_empty() || m.is_empty() || mp.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let sz = n.len().min(m.len());
    let mut res = Vec::with_capacity(sz);
    let mut ofs = Vec::with_capacity(sz);

    let (mut i, mut j) = (0, 0);

    while i < n.len() && j < m.len() {
        if n[i] < m[j] {
            i += 1;
        } else if n[i] > m[j] {
            j += 1;
        } else {
            let adj = proc(&np[i], &mp[j], delta as i16);
            if !adj.is_empty() {
                res.push(n[i]);
                ofs.push(adj);
            }
            i += 1;
            j += 1;
        }
    }

    (res, ofs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect_basics() {
        assert_eq!(intersect_ids(&[1, 3, 5, 7], &[3, 4, 7]), vec![3, 7]);
        assert_eq!(intersect_ids(&[1, 2], &[]), Vec::<u32>::new());
        assert_eq!(intersect_ids(&[], &[1, 2]), Vec::<u32>::new());
    }

    #[test]
    fn test_set_algebra_laws() {
        let a: Vec<u32> = vec![2, 5, 8, 13, 21];
        let b: Vec<u32> = vec![1, 5, 13, 34];
        let c: Vec<u32> = vec![5, 8, 34, 55];

        // intersect(A, A) = A
        assert_eq!(intersect_ids(&a, &a), a);

        // union commutes
        assert_eq!(combine_ids(&a, &b), combine_ids(&b, &a));

        // difference(A, A) is empty
        assert!(exclude_ids(&a, &a).is_empty());

        // intersect distributes over union
        let lhs = intersect_ids(&a, &combine_ids(&b, &c));
        let rhs = combine_ids(&intersect_ids(&a, &b), &intersect_ids(&a, &c));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_results_stay_sorted() {
        let u = combine_ids(&[1, 4, 9], &[2, 4, 8, 16]);
        assert_eq!(u, vec![1, 2, 4, 8, 9, 16]);
        for w in u.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn test_exclude() {
        assert_eq!(exclude_ids(&[10, 20, 30], &[20]), vec![10, 30]);
        assert_eq!(exclude_ids(&[10, 20, 30], &[40]), vec![10, 20, 30]);
        assert_eq!(exclude_ids(&[], &[1]), Vec::<u32>::new());
    }

    #[test]
    fn test_phrase_positions_adjacent() {
        // word one at 4 and 9, word two at 5 and 20: only 4 extends
        assert_eq!(phrase_positions(&[4, 9], &[5, 20], 1), vec![4]);
        assert_eq!(phrase_positions(&[4], &[6], 1), Vec::<i16>::new());
    }

    #[test]
    fn test_proximity_positions_window() {
        // previous phrase at 3; following word within 2 words
        assert_eq!(proximity_positions(&[3], &[5], 2), vec![5]);
        assert_eq!(proximity_positions(&[3], &[6], 2), Vec::<i16>::new());
        // equal positions never match
        assert_eq!(proximity_positions(&[3], &[3], 2), Vec::<i16>::new());
    }

    #[test]
    fn test_extend_positional() {
        let n = vec![5u32, 6, 9];
        let np = vec![vec![1i16], vec![1], vec![7]];
        let m = vec![5u32, 6, 10];
        let mp = vec![vec![2i16], vec![9], vec![2]];

        let (uids, positions) =
            extend_positional_ids(&n, &np, &m, &mp, 1, phrase_positions);
        assert_eq!(uids, vec![5]);
        assert_eq!(positions, vec![vec![1]]);
    }

    #[test]
    fn test_extend_positional_empty_side() {
        let (uids, _) = extend_positional_ids(&[], &[], &[1], &[vec![1]], 1, phrase_positions);
        assert!(uids.is_empty());
    }
}
