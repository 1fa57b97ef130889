//src/taxonomy.rs

use ahash::{AHashMap, AHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::errors::{Error, Result};
use crate::types::{HitCounts, TaxonId, TAXID_ROOT, TAXID_UNCLASSIFIED};

/// A parent map: taxon -> parent taxon. The root maps to itself; every other
/// chain of parent links reaches the root in finitely many steps. Built once
/// per run and read-only afterward, so it is safe to share across threads.
pub type ParentMap = AHashMap<TaxonId, TaxonId>;

/// Parses a tab-delimited taxonomy definition where each record starts with
/// `<taxid>\t<parentid>` (trailing fields such as name and rank are ignored).
///
/// Unparseable records abort with `MalformedTaxonomyRecord`. A taxid that
/// reappears with the same parent is tolerated (first occurrence wins);
/// divergent parents for one id abort with `DuplicateTaxon`.
pub fn build_parent_map<R: BufRead>(reader: R) -> Result<ParentMap> {
    let mut parent_map = ParentMap::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split('\t');
        let parsed = match (fields.next(), fields.next()) {
            (Some(t), Some(p)) => match (t.trim().parse::<u32>(), p.trim().parse::<u32>()) {
                (Ok(taxid), Ok(parent)) if taxid != TAXID_UNCLASSIFIED => Some((taxid, parent)),
                _ => None,
            },
            _ => None,
        };
        let Some((taxid, parent)) = parsed else {
            return Err(Error::MalformedTaxonomyRecord { line_no, line });
        };

        if let Some(&first) = parent_map.get(&taxid) {
            if first != parent {
                return Err(Error::DuplicateTaxon {
                    taxid,
                    first,
                    second: parent,
                });
            }
        } else {
            parent_map.insert(taxid, parent);
        }
    }

    log::info!("Loaded parent map with {} taxa", parent_map.len());
    Ok(parent_map)
}

/// File-opening wrapper around [`build_parent_map`].
pub fn build_parent_map_file<P: AsRef<Path>>(path: P) -> Result<ParentMap> {
    let file = File::open(path)?;
    build_parent_map(BufReader::new(file))
}

/// Return the lowest common ancestor of `a` and `b`.
///
/// The unclassified sentinel acts as an identity element: `lca(0, x) = x` and
/// `lca(x, 0) = x`, which lets classification evidence be folded through a
/// running LCA accumulator. A nonzero id absent from the map is an
/// `UnknownTaxon` error, never silently treated as root.
pub fn lca(parent_map: &ParentMap, a: TaxonId, b: TaxonId) -> Result<TaxonId> {
    if a == TAXID_UNCLASSIFIED || b == TAXID_UNCLASSIFIED {
        let other = if a == TAXID_UNCLASSIFIED { b } else { a };
        if other != TAXID_UNCLASSIFIED && !parent_map.contains_key(&other) {
            return Err(Error::UnknownTaxon(other));
        }
        return Ok(other);
    }

    // Collect ancestors of a, self included. The tree is unbalanced, so the
    // chains are compared through a visited set rather than assuming equal
    // depth.
    let mut a_anc = AHashSet::with_capacity(16);
    let mut node = a;
    loop {
        a_anc.insert(node);
        let p = *parent_map.get(&node).ok_or(Error::UnknownTaxon(node))?;
        if p == node {
            break;
        }
        node = p;
    }

    // Climb b upward until we land on one of a's ancestors.
    let mut node = b;
    loop {
        if a_anc.contains(&node) {
            return Ok(node);
        }
        let p = *parent_map.get(&node).ok_or(Error::UnknownTaxon(node))?;
        if p == node {
            break;
        }
        node = p;
    }
    Ok(TAXID_ROOT)
}

/// Resolve one read's per-taxon hit counts into a single consensus taxon.
///
/// Every hit count is propagated to the taxon itself and all its ancestors,
/// giving each scored node a subtree score. Starting from the root we then
/// repeatedly descend to the scored child with the highest subtree score,
/// breaking ties by higher own-node hit count and then by smaller taxid, and
/// stop at the first node with no scored children. The result is the deepest
/// node reachable this way.
///
/// An empty hit set yields the unclassified sentinel, not an error. A hit id
/// (or any ancestor link) missing from the map is an `UnknownTaxon` error:
/// that indicates an inconsistent index/taxonomy pairing upstream.
pub fn resolve_tree(hit_counts: &HitCounts, parent_map: &ParentMap) -> Result<TaxonId> {
    if hit_counts.is_empty() {
        return Ok(TAXID_UNCLASSIFIED);
    }

    let mut subtree: AHashMap<TaxonId, u64> = AHashMap::with_capacity(hit_counts.len() * 4);
    let mut root = TAXID_ROOT;
    for (&taxon, &count) in hit_counts {
        if taxon == TAXID_UNCLASSIFIED || !parent_map.contains_key(&taxon) {
            return Err(Error::UnknownTaxon(taxon));
        }
        let mut node = taxon;
        loop {
            *subtree.entry(node).or_insert(0) += u64::from(count);
            let p = *parent_map.get(&node).ok_or(Error::UnknownTaxon(node))?;
            if p == node {
                root = node;
                break;
            }
            node = p;
        }
    }

    // Child lists restricted to scored nodes; only these matter for descent.
    let mut children: AHashMap<TaxonId, Vec<TaxonId>> = AHashMap::with_capacity(subtree.len());
    for &node in subtree.keys() {
        let p = parent_map[&node];
        if p != node {
            children.entry(p).or_default().push(node);
        }
    }

    let own = |t: TaxonId| hit_counts.get(&t).copied().unwrap_or(0);
    let mut node = root;
    while let Some(kids) = children.get(&node) {
        let mut best = kids[0];
        for &child in &kids[1..] {
            let (cs, bs) = (subtree[&child], subtree[&best]);
            if cs > bs
                || (cs == bs && (own(child) > own(best) || (own(child) == own(best) && child < best)))
            {
                best = child;
            }
        }
        node = best;
    }
    Ok(node)
}
