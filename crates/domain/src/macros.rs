//! String conversions for the small enums persisted as text columns
//!
//! `impl_domain_status_conversions!` generates `Display`, `FromStr`, an
//! `as_str` accessor and an `ALL` list so every enum stored in the database
//! parses and prints the same way.
//!
//! ```rust
//! use worktrack_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Channel {
//!     Web,
//!     Desktop,
//! }
//!
//! impl_domain_status_conversions!(Channel {
//!     Web => "web",
//!     Desktop => "desktop",
//! });
//!
//! assert_eq!(Channel::Desktop.as_str(), "desktop");
//! assert_eq!("WEB".parse::<Channel>(), Ok(Channel::Web));
//! ```

/// Implements text conversions for a fieldless enum.
///
/// Parsing is case-insensitive and ignores surrounding whitespace; output is
/// always the canonical lowercase form given in the mapping.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$enum_name] = &[$(Self::$variant),+];

            /// Canonical text form stored in the database.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                let normalized = s.trim().to_lowercase();
                $(
                    if normalized == $str {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!("Invalid {}: {}", stringify!($enum_name), s))
            }
        }
    };
}
