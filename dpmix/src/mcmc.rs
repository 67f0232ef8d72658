use rand::Rng;

use crate::error::Result;

pub mod samplers;

/// Trait for Markov chain Monte Carlo transition kernels.
///
/// A step mutates the model in place and leaves it in a state the next step
/// (of this or any other kernel) accepts.
pub trait Kernel<M, D: ?Sized> {
    /// Step the kernel.
    fn step<R: Rng>(&mut self, model: &mut M, data: &D, rng: &mut R) -> Result<()>;

    /// Take `steps` steps, e.g. for burn-in.
    fn multi_step<R: Rng>(
        &mut self,
        model: &mut M,
        data: &D,
        steps: usize,
        rng: &mut R,
    ) -> Result<()> {
        (0..steps).try_for_each(|_| self.step(model, data, rng))
    }

    /// Step indefinitely, yielding `f` of the model after every step.
    ///
    /// A failed step is yielded once and ends the iteration.
    fn iter_sample<'a, T, F, R>(
        &'a mut self,
        model: &'a mut M,
        data: &'a D,
        rng: &'a mut R,
        f: F,
    ) -> impl Iterator<Item = Result<T>> + 'a
    where
        T: 'a,
        F: Fn(&M) -> T + 'a,
        R: Rng,
    {
        let mut failed = false;
        std::iter::from_fn(move || {
            if failed {
                return None;
            }
            let next = self.step(model, data, rng).map(|()| f(model));
            failed = next.is_err();
            Some(next)
        })
    }
}
