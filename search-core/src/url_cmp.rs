//! A total order on URLs by canonicity, used both to resolve duplicate
//! indexings and exposed for callers that need the same ordering.

use std::cmp::Ordering;

/// Returns `Less` if `a` is the more canonical URL, per, in priority order:
/// no query string beats one, fewer path segments wins, shorter length
/// wins, then plain byte comparison.
///
/// The final byte-comparison fallback means canonical choice depends on the
/// URL's encoding (e.g. percent-encoding) when the first three criteria tie;
/// this is inherited from the source design and is not normalized here.
pub fn compare_urls(a: &str, b: &str) -> Ordering {
    let (path_a, has_query_a) = split_query(a);
    let (path_b, has_query_b) = split_query(b);

    has_query_a
        .cmp(&has_query_b)
        .then_with(|| segment_count(path_a).cmp(&segment_count(path_b)))
        .then_with(|| a.len().cmp(&b.len()))
        .then_with(|| a.as_bytes().cmp(b.as_bytes()))
}

fn split_query(url: &str) -> (&str, bool) {
    match url.find('?') {
        Some(idx) => (&url[..idx], true),
        None => (url, false),
    }
}

fn segment_count(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_query_beats_query() {
        assert_eq!(compare_urls("/a", "/a?x=1"), Ordering::Less);
    }

    #[test]
    fn fewer_segments_wins() {
        assert_eq!(compare_urls("/a/b", "/a/b/c"), Ordering::Less);
    }

    #[test]
    fn shorter_length_wins_when_segments_tie() {
        assert_eq!(compare_urls("/ab", "/abc"), Ordering::Less);
    }

    #[test]
    fn falls_back_to_lexicographic_order() {
        assert_eq!(compare_urls("/a", "/b"), Ordering::Less);
    }

    #[test]
    fn is_a_total_order() {
        assert_eq!(compare_urls("/a", "/a"), Ordering::Equal);

        let urls = ["/a", "/a?x=1", "/a/b", "/a/b/c", "/zz"];
        for x in &urls {
            for y in &urls {
                assert_eq!(compare_urls(x, y).reverse(), compare_urls(y, x));
            }
        }
    }
}
