use std::{collections::HashMap, sync::Arc};

use http::Extensions;

use crate::{CsrfToken, VerifiedToken};

/// A value one of the layers stored for the current request.
#[derive(Clone, Debug)]
pub enum Value {
    CsrfToken(CsrfToken),
    Jwt(Arc<VerifiedToken>),
}

/// Request-scoped store the layers write verified tokens into, keyed by their
/// configured context key. Lives in the request's extensions.
#[derive(Clone, Debug, Default)]
pub struct Context {
    values: HashMap<String, Value>,
}

impl Context {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The CSRF token issued for this request, if `key` holds one.
    pub fn csrf_token(&self, key: &str) -> Option<&CsrfToken> {
        match self.values.get(key)? {
            Value::CsrfToken(token) => Some(token),
            Value::Jwt(_) => None,
        }
    }

    /// The verified JWT for this request, if `key` holds one.
    pub fn jwt(&self, key: &str) -> Option<&Arc<VerifiedToken>> {
        match self.values.get(key)? {
            Value::Jwt(token) => Some(token),
            Value::CsrfToken(_) => None,
        }
    }

    pub(crate) fn insert(extensions: &mut Extensions, key: &str, value: Value) {
        match extensions.get_mut::<Context>() {
            Some(context) => {
                context.values.insert(key.to_owned(), value);
            }
            None => {
                let mut context = Context::default();
                context.values.insert(key.to_owned(), value);
                extensions.insert(context);
            }
        }
    }
}
