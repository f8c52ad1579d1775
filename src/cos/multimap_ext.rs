// COS Transfer Library for S3-compatible Object Storage
// Copyright 2025 cos-transfer contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::cos::utils::url_encode;

/// Multimap for string key and string value
pub type Multimap = multimap::MultiMap<String, String>;

pub trait MultimapExt {
    /// Adds a key-value pair to the multimap
    fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V);

    /// Adds a multimap to the current multimap
    fn add_multimap(&mut self, other: Multimap);

    /// Returns the first value whose key matches `key` ignoring ASCII case
    fn get_ignore_case(&self, key: &str) -> Option<&str>;

    /// Whether a key matching `key` ignoring ASCII case is present
    fn contains_key_ignore_case(&self, key: &str) -> bool {
        self.get_ignore_case(key).is_some()
    }

    /// Converts multimap to HTTP query string, keys in sorted order
    fn to_query_string(&self) -> String;
}

impl MultimapExt for Multimap {
    fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.insert(key.into(), value.into());
    }

    fn add_multimap(&mut self, other: Multimap) {
        for (key, values) in other.into_iter() {
            self.insert_many(key, values);
        }
    }

    fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn to_query_string(&self) -> String {
        let mut keys: Vec<&String> = self.keys().collect();
        keys.sort();

        let mut query = String::new();
        for key in keys {
            for value in self.get_vec(key).into_iter().flatten() {
                if !query.is_empty() {
                    query.push('&');
                }
                query.push_str(&url_encode(key));
                // Sub-resources such as `uploads` carry no value
                if !value.is_empty() {
                    query.push('=');
                    query.push_str(&url_encode(value));
                }
            }
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_sorted_and_encoded() {
        let mut m = Multimap::new();
        m.add("uploadId", "a b/c");
        m.add("partNumber", "3");
        assert_eq!(m.to_query_string(), "partNumber=3&uploadId=a%20b%2Fc");
    }

    #[test]
    fn test_empty_value_sub_resource() {
        let mut m = Multimap::new();
        m.add("uploads", "");
        assert_eq!(m.to_query_string(), "uploads");
    }

    #[test]
    fn test_get_ignore_case() {
        let mut m = Multimap::new();
        m.add("Content-Type", "application/xml");
        assert_eq!(m.get_ignore_case("content-type"), Some("application/xml"));
        assert!(!m.contains_key_ignore_case("range"));
    }
}
