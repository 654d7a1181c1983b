/// Number of elements described by a shape. A rank-0 shape holds one element.
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}
