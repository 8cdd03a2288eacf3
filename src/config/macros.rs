macro_rules! baud_rates {
    {
        $(#[$attr:meta])*
        pub enum $name:ident {
            $($variant:ident = $rate:literal),+ $(,)?
        }
    } => {
        $(#[$attr])*
        pub enum $name {
            $(
                #[doc = concat!(stringify!($rate), " baud")]
                $variant,
            )+
            /// A non-standard rate in baud
            Custom(u32),
        }

        impl $name {
            /// Every standard rate, slowest first
            pub const STANDARD: &'static [$name] = &[$($name::$variant),+];

            /// The rate in baud, `0` for the hang-up sentinel
            pub fn rate(&self) -> u32 {
                match self {
                    $($name::$variant => $rate,)+
                    $name::Custom(rate) => *rate,
                }
            }

            /// Map a numeric rate onto a standard variant where one exists
            pub fn from_rate(rate: u32) -> Self {
                match rate {
                    $($rate => $name::$variant,)+
                    other => $name::Custom(other),
                }
            }

            /// Whether this is one of the enumerated rates
            pub fn is_standard(&self) -> bool {
                !matches!(self, $name::Custom(_))
            }
        }
    };
}
