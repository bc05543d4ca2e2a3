//! Assertion utilities for testing

/// Assert that a result is OK and unwrap it
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("Expected Ok, got Err: {:?}", err),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("Expected Ok, got Err: {:?} ({})", err, format!($($arg)+)),
        }
    };
}

/// Assert that a result is Err and unwrap the error
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(val) => panic!("Expected Err, got Ok: {:?}", val),
            Err(err) => err,
        }
    };
}

/// Polls `$cond` on the paused tokio clock, one second at a time, until it holds
/// or `$secs` seconds have passed.
#[macro_export]
macro_rules! wait_until {
    ($secs:expr, $cond:expr) => {{
        let mut waited = 0u64;
        while !$cond {
            if waited >= $secs {
                panic!("condition not met within {}s: {}", $secs, stringify!($cond));
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            waited += 1;
        }
    }};
}
