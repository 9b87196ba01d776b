/// Configuration macros
///
/// `config_struct!` declares a configuration struct with every field's default
/// next to its type, and generates:
/// - The struct with public fields
/// - A `Default` implementation built from the inline defaults
/// - Serde support with `#[serde(default)]`, so partial TOML files load
///
/// # Example
/// ```
/// envhub::config_struct! {
///     pub struct OutboxConfig {
///         capacity: usize = 256,
///         coalesce: bool = false,
///     }
/// }
///
/// let cfg: OutboxConfig = toml::from_str("capacity = 8").unwrap();
/// assert_eq!(cfg.capacity, 8);
/// assert!(!cfg.coalesce);
/// ```
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}
