/// First error raised by a scan worker, shared with the consumer of its stream.
#[derive(Debug, Clone)]
pub struct Flag<IntoError>(std::sync::Arc<std::sync::Mutex<Option<IntoError>>>)
where
    IntoError: Clone + Send;

impl<IntoError> Flag<IntoError>
where
    IntoError: Clone + Send,
{
    pub fn new() -> Self {
        Self(std::sync::Arc::new(std::sync::Mutex::new(None)))
    }

    pub fn store_error_if_not_set<Error>(&self, error: Error)
    where
        Error: Into<IntoError>,
    {
        // unwrap: mutex is not poisoned
        self.0.lock().unwrap().get_or_insert(error.into());
    }

    /// Later calls keep returning the same error.
    pub fn load_error(&self) -> Result<(), IntoError> {
        // unwrap: mutex is not poisoned
        match self.0.lock().unwrap().as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl<IntoError> Default for Flag<IntoError>
where
    IntoError: Clone + Send,
{
    fn default() -> Self {
        Self::new()
    }
}
