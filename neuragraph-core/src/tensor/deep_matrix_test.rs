use super::*;

fn stack(values: &[f64]) -> DeepMatrix {
    let matrices = values.iter().map(|&v| Matrix::filled(2, 2, v)).collect();
    DeepMatrix::new(matrices).expect("Test stack creation failed")
}

#[test]
fn test_new_requires_uniform_shapes() {
    let result = DeepMatrix::new(vec![Matrix::zeros(2, 2), Matrix::zeros(2, 3)]);
    assert!(matches!(result, Err(NeuraGraphError::ShapeMismatch { .. })));
    assert_eq!(DeepMatrix::new(Vec::new()), Err(NeuraGraphError::EmptyStack));
}

#[test]
fn test_shape_and_indexing() {
    let s = stack(&[1.0, 2.0, 3.0]);
    assert_eq!(s.depth(), 3);
    assert_eq!(s.shape(), vec![3, 2, 2]);
    assert_eq!(s[2][(1, 1)], 3.0);
    assert!(s.get(3).is_none());
    assert_eq!((&s).into_iter().count(), 3);
}

#[test]
fn test_empty_keeps_member_shape() {
    let e = DeepMatrix::empty(4, 5);
    assert_eq!(e.depth(), 0);
    assert_eq!(e.shape(), vec![0, 4, 5]);
}

#[test]
fn test_add_assign_is_per_depth() -> Result<(), NeuraGraphError> {
    let mut a = stack(&[1.0, 2.0]);
    let b = stack(&[10.0, 20.0]);
    a.add_assign(&b)?;
    assert_eq!(a[0].to_vec(), vec![11.0; 4]);
    assert_eq!(a[1].to_vec(), vec![22.0; 4]);
    assert_eq!(a.sum(), 4.0 * 33.0);

    let deeper = stack(&[1.0, 1.0, 1.0]);
    assert!(matches!(
        a.add_assign(&deeper),
        Err(NeuraGraphError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_members_mutable_in_place() -> Result<(), NeuraGraphError> {
    let mut s = stack(&[0.0, 0.0]);
    if let Some(m) = s.get_mut(1) {
        m.set(0, 0, 7.0)?;
    }
    assert_eq!(s[1][(0, 0)], 7.0);
    assert_eq!(s.depth(), 2);
    Ok(())
}
