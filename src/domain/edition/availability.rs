use super::value_objects::ArtworkEdition;

/// Whether `requested_qty` more units of `edition` can be sold.
///
/// Callers must pass a ledger row read immediately before the decision;
/// a value cached from page load is never good enough to mutate on.
pub fn is_available(edition: &ArtworkEdition, requested_qty: u32) -> bool {
    if requested_qty == 0 {
        return false;
    }
    u64::from(edition.editions_sold) + u64::from(requested_qty) <= u64::from(edition.edition_limit)
}
