use aliri_braid::braid;
use std::fmt;

macro_rules! limited_reveal {
    ($ty:ty: $hidden:literal, $default:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str("\"")?;
                    limited_reveal(self.as_str(), &mut *f, $default)?;
                    f.write_str("\"")
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    limited_reveal(self.as_str(), &mut *f, usize::MAX)
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }
    };
}

fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        f.write_str("…")
    } else if max_len > unprotected.len() {
        f.write_str(unprotected)
    } else {
        match unprotected.char_indices().nth(max_len - 2) {
            Some((idx, c)) if idx + c.len_utf8() < unprotected.len() => {
                f.write_str(&unprotected[0..idx + c.len_utf8()])?;
                f.write_str("…")
            }
            _ => f.write_str(unprotected),
        }
    }
}

/// A project identifier issued by the identity platform
///
/// Identifiers of at least 32 characters embed the project's region in
/// characters 1 through 4.
#[braid(serde)]
pub struct ProjectId;

impl ProjectIdRef {
    /// The region encoded in the identifier, if any
    ///
    /// ```
    /// use descope::ProjectIdRef;
    ///
    /// let id = ProjectIdRef::from_str("Peuc12z2SP0AQgrqkHCdD7u5fRJ4lOta");
    /// assert_eq!(id.region(), Some("euc1"));
    ///
    /// let id = ProjectIdRef::from_str("P2CtzUhdqpIF2ys9gg7ms06UvtC4");
    /// assert_eq!(id.region(), None);
    /// ```
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        let id = self.as_str();
        if id.len() >= 32 {
            id.get(1..5)
        } else {
            None
        }
    }
}

/// A refresh token, used to look up the details of the signed-in user
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

limited_reveal!(RefreshTokenRef: "REFRESH TOKEN", 15);

/// A management key, used by administrative API calls
#[braid(serde, debug = "owned", display = "owned")]
pub struct ManagementKey;

limited_reveal!(ManagementKeyRef: "MANAGEMENT KEY", 5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_project_id_carries_region() {
        let id = ProjectIdRef::from_str("Peuc12z2SP0AQgrqkHCdD7u5fRJ4lOta");
        assert_eq!(id.region(), Some("euc1"));
    }

    #[test]
    fn short_project_id_has_no_region() {
        let id = ProjectIdRef::from_str("P2CtzUhdqpIF2ys9gg7ms06UvtC4");
        assert_eq!(id.region(), None);
    }

    #[test]
    fn region_requires_at_least_32_characters() {
        let short = ProjectIdRef::from_str("Peuc12z2SP0AQgrqkHCdD7u5fRJ4lOt");
        assert_eq!(short.as_str().len(), 31);
        assert_eq!(short.region(), None);

        let long = ProjectIdRef::from_str("Peuc12z2SP0AQgrqkHCdD7u5fRJ4lOta");
        assert_eq!(long.as_str().len(), 32);
        assert_eq!(long.region(), Some("euc1"));
    }

    #[test]
    fn refresh_token_is_redacted() {
        let token = RefreshToken::from_static("eyJhbGciOiJSUzI1NiJ9.secret.sig");
        assert_eq!(format!("{:?}", token), "***REFRESH TOKEN***");
        assert_eq!(format!("{}", token), "***REFRESH TOKEN***");
    }

    #[test]
    fn alternate_debug_reveals_a_prefix() {
        let key = ManagementKey::from_static("K2abcdefghijklmnop");
        assert_eq!(format!("{:#?}", key), "\"K2ab…\"");
        assert_eq!(format!("{:#}", key), "K2abcdefghijklmnop");
    }
}
