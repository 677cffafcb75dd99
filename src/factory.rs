//! Resource creation and reset contract

use std::fmt;
use std::marker::PhantomData;

/// Creates resources for a pool and returns them to a reusable state
///
/// Implementations may keep per-resource reset logic in [`reset`](Self::reset)
/// or carry the reset state themselves and ignore the argument.
///
/// # Examples
///
/// ```
/// use respool::ResourceFactory;
///
/// struct Buffers;
///
/// impl ResourceFactory<Vec<u8>> for Buffers {
///     type Error = String;
///
///     fn create(&self) -> Result<Vec<u8>, String> {
///         Ok(Vec::with_capacity(4096))
///     }
///
///     fn reset(&self, buf: &mut Vec<u8>) -> Result<(), String> {
///         buf.clear();
///         Ok(())
///     }
/// }
/// ```
pub trait ResourceFactory<T>: Send + Sync {
    type Error: fmt::Display;

    /// Construct a new resource
    fn create(&self) -> Result<T, Self::Error>;

    /// Prepare a returned resource for its next checkout
    fn reset(&self, _resource: &mut T) -> Result<(), Self::Error> {
        Ok(())
    }
}

type ResetFn<T, E> = Box<dyn Fn(&mut T) -> Result<(), E> + Send + Sync>;

/// Adapts plain closures to [`ResourceFactory`]
///
/// ```
/// use respool::{FnFactory, ResourceFactory};
///
/// let factory = FnFactory::new(|| Ok::<_, String>(vec![0u8; 16]))
///     .with_reset(|buf: &mut Vec<u8>| {
///         buf.fill(0);
///         Ok(())
///     });
///
/// let mut buf = factory.create().unwrap();
/// buf[0] = 7;
/// factory.reset(&mut buf).unwrap();
/// assert_eq!(buf[0], 0);
/// ```
pub struct FnFactory<T, E, C> {
    create: C,
    reset: Option<ResetFn<T, E>>,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<T, E, C> FnFactory<T, E, C>
where
    C: Fn() -> Result<T, E> + Send + Sync,
{
    /// Wrap a creation function; reset is a no-op until one is supplied
    pub fn new(create: C) -> Self {
        Self {
            create,
            reset: None,
            _marker: PhantomData,
        }
    }

    /// Supply a reset function
    pub fn with_reset<R>(mut self, reset: R) -> Self
    where
        R: Fn(&mut T) -> Result<(), E> + Send + Sync + 'static,
    {
        self.reset = Some(Box::new(reset));
        self
    }
}

impl<T, E, C> ResourceFactory<T> for FnFactory<T, E, C>
where
    C: Fn() -> Result<T, E> + Send + Sync,
    E: fmt::Display,
{
    type Error = E;

    fn create(&self) -> Result<T, E> {
        (self.create)()
    }

    fn reset(&self, resource: &mut T) -> Result<(), E> {
        match self.reset {
            Some(ref reset) => reset(resource),
            None => Ok(()),
        }
    }
}

impl<T, E, C> fmt::Debug for FnFactory<T, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFactory")
            .field("has_reset", &self.reset.is_some())
            .finish()
    }
}
