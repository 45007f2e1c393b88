use crate::DimMask;
use test_log::test;

#[test]
fn test_set_get_count() {
    let mut m = DimMask::new();
    assert!(m.is_empty());
    for i in (0..256).step_by(3) {
        m.set(i, true);
    }
    assert_eq!(m.count(), 86);
    assert!(m.get(255));
    assert!(!m.get(254));
    m.set(255, false);
    assert!(!m.get(255));
    assert_eq!(m.count(), 85);
}

#[test]
fn test_iter_ascending() {
    let mut m = DimMask::new();
    for i in [200, 3, 64, 63, 128] {
        m.set(i, true);
    }
    let v: Vec<usize> = m.iter().collect();
    assert_eq!(v, vec![3, 63, 64, 128, 200]);

    let mut other = DimMask::new();
    other.set(7, true);
    m.union(&other);
    assert_eq!(m.iter().next(), Some(3));
    assert_eq!(m.count(), 6);
}
