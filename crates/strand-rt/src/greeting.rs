// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Fixed greeting.

pub const GREETING: &str = "Hello from me";

#[derive(Debug, Clone, Copy, Default)]
pub struct HelloWorld;

impl HelloWorld {
    pub fn new() -> Self {
        Self
    }

    pub fn hello(&self) -> &'static str {
        GREETING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn says_hello() {
        assert_eq!(HelloWorld::new().hello(), "Hello from me");
    }
}
