// Exported with `#[macro_export]` so both the library and the binary
// crate can use them, re-exported below for `crate::macros::<name>!`
#![allow(unused_imports)]

// Only used for compile-time address literals, a typo here is a bug
#[macro_export]
macro_rules! parse_address {
    ($addr:tt) => {
        $addr.parse::<alloy::primitives::Address>().unwrap()
    };
}

#[macro_export]
macro_rules! print_kv {
    ($a: expr, $k:expr, $v: expr, $cv: ident) => {
        println!(
            "    {:align$}{}",
            format!("{}:", $k).white().bold(),
            $v.to_string().$cv(),
            align = $a
        )
    };
}

pub(crate) use parse_address;
pub(crate) use print_kv;
