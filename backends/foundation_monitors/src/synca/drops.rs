/// `RunOnDrop` runs a function when it gets dropped, providing a similar
/// convention to go's defer. Actor loops use it so their exit is traced
/// whether they return normally or unwind.
pub struct RunOnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> RunOnDrop<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for RunOnDrop<F> {
    fn drop(&mut self) {
        if let Some(cb) = self.0.take() {
            cb();
        }
    }
}
