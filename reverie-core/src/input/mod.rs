//! Input method abstraction.
//!
//! The `InputMethod` trait is the extension point for new modalities: a
//! producer is shown a prompt, races to resolve it from its own thread, and
//! is dismissed when the decision is over. Speech lives in [`crate::speech`];
//! click and gesture producers live here.

pub mod click;
pub mod gesture;
pub(crate) mod listener;

use crate::error::Result;
use crate::events::InputKind;
use crate::prompt::PromptHandle;

/// A producer that can resolve a prompt through its own modality.
pub trait InputMethod: Send + 'static {
    fn kind(&self) -> InputKind;

    /// Begin listening for `prompt`. May resolve before returning.
    ///
    /// # Errors
    /// Returned errors are logged by the prompt; other producers stay live.
    fn show(&mut self, prompt: PromptHandle) -> Result<()>;

    /// Stop listening and release anything acquired in `show`.
    /// Must be idempotent and safe without a prior `show`.
    fn dismiss(&mut self);
}

/// Ordered, fixed set of producers attached to one prompt.
///
/// No locking of its own; the owning prompt serialises show and dismiss.
#[derive(Default)]
pub struct InputMethods {
    methods: Vec<Box<dyn InputMethod>>,
}

impl InputMethods {
    pub fn new(methods: Vec<Box<dyn InputMethod>>) -> Self {
        Self { methods }
    }

    /// Builder-style registration, keeping order.
    pub fn with(mut self, method: impl InputMethod) -> Self {
        self.methods.push(Box::new(method));
        self
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Kinds in registration order.
    pub fn kinds(&self) -> Vec<InputKind> {
        self.methods.iter().map(|m| m.kind()).collect()
    }

    /// Visit every producer in registration order.
    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut dyn InputMethod),
    {
        for method in &mut self.methods {
            f(method.as_mut());
        }
    }
}

impl std::fmt::Debug for InputMethods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}
