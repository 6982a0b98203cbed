use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A cheaply-cloneable identifier (agent name, username, workflow id, ...).
///
/// Scaled down from the full string-interning scheme a mesh-scale gateway
/// needs: at controller scale (hundreds of agents, not tens of thousands)
/// a plain `Arc<str>` gives cheap clones and `Display`/`Eq`/`Hash` without
/// the complexity of a global intern table.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Arc<str>);

impl Id {
	pub fn new(s: impl Into<Arc<str>>) -> Self {
		Self(s.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Id {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for Id {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Id({:?})", self.0)
	}
}

impl From<&str> for Id {
	fn from(s: &str) -> Self {
		Self(Arc::from(s))
	}
}

impl From<String> for Id {
	fn from(s: String) -> Self {
		Self(Arc::from(s.as_str()))
	}
}

impl std::borrow::Borrow<str> for Id {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl PartialEq<str> for Id {
	fn eq(&self, other: &str) -> bool {
		self.as_str() == other
	}
}
