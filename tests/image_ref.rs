// ABOUTME: Property tests for image reference parsing and rendering.

use proptest::prelude::*;
use relevo::types::ImageRef;

fn reference() -> impl Strategy<Value = String> {
    let registry = proptest::option::of("[a-z]{2,6}\\.(test|io)(:[0-9]{2,4})?");
    let name = "[a-z][a-z0-9]{0,7}(/[a-z][a-z0-9]{0,7})?";
    let tag = proptest::option::of("[a-z0-9][a-z0-9_.-]{0,7}");
    let digest = proptest::option::of("sha256:[a-f0-9]{8,16}");

    (registry, name, tag, digest).prop_map(|(registry, name, tag, digest)| {
        let mut reference = String::new();
        if let Some(registry) = registry {
            reference.push_str(&registry);
            reference.push('/');
        }
        reference.push_str(&name);
        if let Some(tag) = tag {
            reference.push(':');
            reference.push_str(&tag);
        }
        if let Some(digest) = digest {
            reference.push('@');
            reference.push_str(&digest);
        }
        reference
    })
}

proptest! {
    #[test]
    fn rendering_then_parsing_is_stable(input in reference()) {
        let parsed = ImageRef::parse(&input).unwrap();
        let rendered = parsed.to_string();
        let reparsed = ImageRef::parse(&rendered).unwrap();
        prop_assert_eq!(&parsed, &reparsed);
        prop_assert_eq!(rendered, reparsed.to_string());
    }

    #[test]
    fn digest_pinning_drops_the_tag_and_survives_reparsing(
        input in reference(),
        hash in "[a-f0-9]{12}",
    ) {
        let digest = format!("sha256:{hash}");
        let pinned = ImageRef::parse(&input).unwrap().with_digest(&digest);
        let reparsed = ImageRef::parse(&pinned.to_string()).unwrap();
        prop_assert_eq!(reparsed.digest(), Some(digest.as_str()));
        prop_assert_eq!(reparsed.tag(), None);
    }
}
