//! # Consensus Gate
//!
//! A settlement is accepted only with attestations over its canonical
//! digest from at least `min_attestations` distinct members of the batch's
//! own committee. Valid signatures from outside the committee do not count.

use veil_core::{Address, ContentDigest, VeilError};
use veil_crypto::{Attestation, AttestationVerifier};

/// Count committee attestations over `digest` and enforce `required`.
///
/// Returns the counted signers in first-seen order.
pub fn check_threshold(
    verifier: &dyn AttestationVerifier,
    digest: &ContentDigest,
    attestations: &[Attestation],
    committee: &[Address],
    required: usize,
) -> Result<Vec<Address>, VeilError> {
    let valid = verifier.verified_signers(digest, attestations);
    let (members, outsiders): (Vec<Address>, Vec<Address>) =
        valid.into_iter().partition(|a| committee.contains(a));
    if members.len() >= required {
        return Ok(members);
    }
    let invalid = attestations.len().saturating_sub(members.len() + outsiders.len());
    let mut reason = format!("{} attestations submitted", attestations.len());
    if !outsiders.is_empty() {
        reason.push_str(&format!(", {} from outside the committee", outsiders.len()));
    }
    if invalid > 0 {
        reason.push_str(&format!(", {invalid} invalid or duplicate"));
    }
    Err(VeilError::Consensus {
        reason,
        valid: members.len(),
        required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_crypto::{Ed25519AttestationVerifier, Ed25519KeyPair};

    fn keys(n: u8) -> Vec<Ed25519KeyPair> {
        (1..=n).map(|i| Ed25519KeyPair::from_seed(&[i; 32])).collect()
    }

    #[test]
    fn threshold_met_by_committee() {
        let ks = keys(3);
        let committee: Vec<Address> = ks.iter().map(|k| k.address()).collect();
        let digest = ContentDigest([5; 32]);
        let atts: Vec<_> = ks[..2].iter().map(|k| Attestation::sign(k, &digest).unwrap()).collect();
        let signers = check_threshold(&Ed25519AttestationVerifier, &digest, &atts, &committee, 2).unwrap();
        assert_eq!(signers, committee[..2].to_vec());
    }

    #[test]
    fn outsiders_and_duplicates_do_not_count() {
        let ks = keys(4);
        let committee: Vec<Address> = ks[..3].iter().map(|k| k.address()).collect();
        let digest = ContentDigest([5; 32]);
        let member = Attestation::sign(&ks[0], &digest).unwrap();
        let outsider = Attestation::sign(&ks[3], &digest).unwrap();
        let err = check_threshold(
            &Ed25519AttestationVerifier,
            &digest,
            &[member, member, outsider],
            &committee,
            2,
        )
        .unwrap_err();
        assert!(matches!(err, VeilError::Consensus { valid: 1, required: 2, .. }));
    }

    #[test]
    fn signature_over_other_digest_rejected() {
        let ks = keys(2);
        let committee: Vec<Address> = ks.iter().map(|k| k.address()).collect();
        let atts: Vec<_> = ks
            .iter()
            .map(|k| Attestation::sign(k, &ContentDigest([1; 32])).unwrap())
            .collect();
        assert!(check_threshold(&Ed25519AttestationVerifier, &ContentDigest([2; 32]), &atts, &committee, 1).is_err());
    }
}
