//! Gateway-side pagination over merged results
//!
//! Federated lists are merged in the gateway, so member `continue` tokens are
//! meaningless to callers. The gateway pages the merged result itself and
//! hands out an opaque token encoding `{total, pageSize, offset}`.
//!
//! Decoding never fails a request: an empty or unreadable token restarts at
//! offset 0.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Paging position carried inside a continue token
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Total number of items in the merged result
    pub total: usize,
    /// Requested page size
    pub page_size: usize,
    /// Offset of the page that was just served
    pub offset: usize,
}

/// Encode the token for the page after the one just served.
///
/// Returns an empty string when there is nothing left to fetch.
pub fn encode_continue(pagination: Pagination, returned: usize) -> String {
    if pagination.page_size >= pagination.total
        || pagination.offset + returned >= pagination.total
    {
        return String::new();
    }

    let next = Pagination {
        offset: pagination.offset + returned,
        ..pagination
    };
    // Serializing three integers cannot fail
    let json = serde_json::to_vec(&next).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode the offset from a continue token, 0 if it is empty or malformed
pub fn decode_continue(token: &str) -> usize {
    if token.is_empty() {
        return 0;
    }

    let decoded = URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Pagination>(&bytes).ok());

    match decoded {
        Some(p) => p.offset,
        None => {
            debug!(token = %token, "Ignoring malformed continue token");
            0
        }
    }
}

/// One page of a merged result
#[derive(Debug, PartialEq)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Token for the next page, empty on the last page
    pub continue_token: String,
    /// Items after this page, when there is a next page
    pub remaining: Option<i64>,
}

/// Cut `items` down to the page selected by `limit` and `token`.
///
/// Without a positive `limit` everything is returned on one page.
pub fn paginate<T>(items: Vec<T>, limit: Option<u32>, token: Option<&str>) -> Page<T> {
    let total = items.len();
    let page_size = match limit {
        Some(l) if l > 0 => l as usize,
        _ => {
            return Page {
                items,
                continue_token: String::new(),
                remaining: None,
            }
        }
    };

    let offset = decode_continue(token.unwrap_or("")).min(total);
    let page: Vec<T> = items.into_iter().skip(offset).take(page_size).collect();
    let returned = page.len();

    let continue_token = encode_continue(
        Pagination {
            total,
            page_size,
            offset,
        },
        returned,
    );
    let remaining = (!continue_token.is_empty()).then(|| (total - offset - returned) as i64);

    Page {
        items: page,
        continue_token,
        remaining,
    }
}
