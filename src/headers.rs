use std::fmt;

/// Case-insensitive, order-preserving HTTP header map.
///
/// Lookup treats names as case-insensitive while the original spelling is
/// retained for serialization. Insertion order among distinct names is
/// preserved, and a header that appears several times keeps its values as
/// separate entries.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Entry>,
}

#[derive(Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    values: Vec<String>,
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Check whether a header exists.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Get a header, coalescing multiple values with commas.
    ///
    /// Note that comma-joining does not make sense for every header.
    /// `Set-Cookie` in particular should be read with [`Headers::get_all`].
    pub fn get(&self, name: &str) -> Option<String> {
        self.position(name)
            .map(|i| self.entries[i].values.join(","))
    }

    /// Get every value recorded for a header, in insertion order.
    ///
    /// Returns an empty slice if the header does not exist.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.position(name)
            .map(|i| self.entries[i].values.as_slice())
            .unwrap_or(&[])
    }

    /// Set a header, replacing any existing values.
    ///
    /// The new spelling of the name is retained, and an existing header
    /// keeps its position in the serialization order.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_all(name, vec![value.into()]);
    }

    /// Set a header to a list of values, replacing any existing ones.
    pub fn set_all(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => {
                self.entries[i].name = name;
                self.entries[i].values = values;
            }
            None => self.entries.push(Entry { name, values }),
        }
    }

    /// Add a value to a header without overwriting existing ones.
    ///
    /// The original-case name of the first insertion wins.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].values.push(value.into()),
            None => self.entries.push(Entry {
                name,
                values: vec![value.into()],
            }),
        }
    }

    /// Remove a header. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// Iterate over `(original-case name, values)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.values.as_slice()))
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map holds no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, values) in self.iter() {
            map.entry(&name, &values);
        }
        map.finish()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}
