cfg_if::cfg_if! {
    if #[cfg(unix)] {
        pub(crate) mod unix;
        pub(crate) use unix::*;
    }
}
