/// An ordered header multimap mirroring how HTTP/1.x header blocks arrive on
/// the wire: lookup is case-insensitive, the original casing is preserved
/// for forwarding, and a value containing `", "` is treated as a
/// comma-joined value list.
///
/// Inserting a name that is already present replaces that entry in place —
/// last occurrence wins. Collapsing duplicates this way loses repeated
/// headers such as Set-Cookie; that is a deliberate simplification of this
/// proxy, kept intact so cached replays match the forwarded originals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderBag {
    entries: Vec<HeaderEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderEntry {
    name: String,
    lower_name: String,
    values: Vec<String>,
}

impl HeaderEntry {
    fn new(name: &str, values: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            lower_name: name.to_ascii_lowercase(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lower_name(&self) -> &str {
        &self.lower_name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn joined_value(&self) -> String {
        self.values.join(", ")
    }
}

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one raw header line. Lines without a colon are silently
    /// dropped; otherwise the line is split at the first colon, both sides
    /// trimmed, and the value split on `", "` into its list form.
    pub fn push_line(&mut self, line: &str) {
        let Some((name, value)) = line.split_once(':') else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.set(name, value.trim());
    }

    /// Sets a header to a (possibly comma-joined) value, replacing any
    /// existing entry with the same case-insensitive name.
    pub fn set(&mut self, name: &str, value: &str) {
        let values = split_value_list(value);
        let lower = name.to_ascii_lowercase();
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.lower_name == lower)
        {
            Some(entry) => {
                *entry = HeaderEntry::new(name, values);
            }
            None => self.entries.push(HeaderEntry::new(name, values)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderEntry> {
        let lower = name.to_ascii_lowercase();
        self.entries.iter().find(|entry| entry.lower_name == lower)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.get(name)?.values.first().map(String::as_str)
    }

    pub fn joined_value(&self, name: &str) -> Option<String> {
        self.get(name).map(HeaderEntry::joined_value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn split_value_list(value: &str) -> Vec<String> {
    value.split(", ").map(str::to_string).collect()
}
