//! HTTP status classification. All ranges are half-open on the upper bound.

pub fn is_ok(status: u16) -> bool { status == 200 }

pub fn is_successful(status: u16) -> bool { (200..300).contains(&status) }

pub fn is_redirect(status: u16) -> bool { (300..400).contains(&status) }

pub fn is_client_error(status: u16) -> bool { (400..500).contains(&status) }

pub fn is_server_error(status: u16) -> bool { status >= 500 }

pub fn is_failed(status: u16) -> bool { is_client_error(status) || is_server_error(status) }
