//! The composition root wiring the three factories over shared
//! collaborators.

use crate::cache::KeyCache;
use crate::factory::default::DefaultKeyFactory;
use crate::factory::dep_file::DepFileKeyFactory;
use crate::factory::input::InputKeyFactory;
use crate::key::KeySeed;
use crate::provider::{FileHasher, ManifestProvider, RuleResolver};
use std::sync::Arc;

/// Configuration for one build invocation's key computations.
#[derive(Debug, Clone, Copy)]
pub struct KeyConfig {
    /// The global seed folded into every key.
    pub seed: KeySeed,
    /// Maximum total bytes of file content an input-based (or dep-file)
    /// key may hash before failing with
    /// [`SizeLimitExceeded`](crate::RuleKeyError::SizeLimitExceeded).
    pub input_size_limit: u64,
}

/// The rule-key factories used by the build engine.
///
/// Holds no algorithmic logic of its own; it exists so all three factories
/// are constructed over the same seed, hasher, and resolver. Divergence
/// there would silently desynchronize cache correctness between the
/// strategies.
pub struct RuleKeyFactories {
    /// The full structural factory (memoized through the shared cache).
    pub default: DefaultKeyFactory,
    /// The consumed-bytes factory.
    pub input_based: InputKeyFactory,
    /// The manifest-scoped factory.
    pub dep_file: DepFileKeyFactory,
}

impl RuleKeyFactories {
    /// Wires the three factories over shared collaborators.
    ///
    /// The cache must be fresh for this invocation's seed and
    /// configuration; reusing one across seed changes would serve keys
    /// computed under the old seed.
    pub fn new(
        config: KeyConfig,
        hasher: Arc<dyn FileHasher>,
        resolver: Arc<dyn RuleResolver>,
        manifests: Arc<dyn ManifestProvider>,
        cache: Arc<KeyCache>,
    ) -> Self {
        Self {
            default: DefaultKeyFactory::new(
                config.seed,
                Arc::clone(&hasher),
                Arc::clone(&resolver),
                cache,
            ),
            input_based: InputKeyFactory::new(
                config.seed,
                Arc::clone(&hasher),
                Arc::clone(&resolver),
                config.input_size_limit,
            ),
            dep_file: DepFileKeyFactory::new(
                config.seed,
                hasher,
                resolver,
                manifests,
                config.input_size_limit,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleKeyError;
    use crate::field::FileRef;
    use crate::testutil::{TestEnv, TestRule};

    fn bundle(env: &Arc<TestEnv>, seed: u64) -> RuleKeyFactories {
        RuleKeyFactories::new(
            KeyConfig {
                seed: KeySeed::new(seed),
                input_size_limit: 1 << 20,
            },
            Arc::clone(env) as Arc<dyn FileHasher>,
            Arc::clone(env) as Arc<dyn RuleResolver>,
            Arc::clone(env) as Arc<dyn ManifestProvider>,
            Arc::new(KeyCache::new()),
        )
    }

    #[test]
    fn all_factories_share_the_seed() {
        let env = TestEnv::new();
        env.write_file("main.c", b"int main() {}");
        env.set_manifest("//app:main", &["main.c"]);
        let rule = env.add_rule(
            TestRule::new("//app:main").field("src", FileRef::Path("main.c".into())),
        );

        let a = bundle(&env, 1);
        let b = bundle(&env, 2);
        assert_ne!(
            a.default.key(rule.as_ref()).unwrap(),
            b.default.key(rule.as_ref()).unwrap()
        );
        assert_ne!(
            a.input_based.key(rule.as_ref()).unwrap(),
            b.input_based.key(rule.as_ref()).unwrap()
        );
        assert_ne!(
            a.dep_file.keys(rule.as_ref()).unwrap().manifest_key,
            b.dep_file.keys(rule.as_ref()).unwrap().manifest_key
        );
    }

    #[test]
    fn strategies_produce_distinct_keys() {
        let env = TestEnv::new();
        env.write_file("main.c", b"int main() {}");
        env.set_manifest("//app:main", &["main.c"]);
        let rule = env.add_rule(
            TestRule::new("//app:main").field("src", FileRef::Path("main.c".into())),
        );

        let factories = bundle(&env, 1);
        let default = factories.default.key(rule.as_ref()).unwrap();
        let input = factories.input_based.key(rule.as_ref()).unwrap();
        let dep_file = factories.dep_file.keys(rule.as_ref()).unwrap();
        assert_ne!(default, input);
        assert_ne!(default, dep_file.manifest_key);
        assert_ne!(input, dep_file.manifest_key);
    }

    #[test]
    fn recoverable_fallback_path() {
        // Oversized inputs: the engine falls back from the input-based key
        // to the default key, which has no size limit.
        let env = TestEnv::new();
        env.write_file("big.bin", &[0u8; 4096]);
        let rule = env.add_rule(
            TestRule::new("//app:main").field("data", FileRef::Path("big.bin".into())),
        );

        let factories = RuleKeyFactories::new(
            KeyConfig {
                seed: KeySeed::new(1),
                input_size_limit: 64,
            },
            Arc::clone(&env) as Arc<dyn FileHasher>,
            Arc::clone(&env) as Arc<dyn RuleResolver>,
            Arc::clone(&env) as Arc<dyn ManifestProvider>,
            Arc::new(KeyCache::new()),
        );
        let err = factories.input_based.key(rule.as_ref()).unwrap_err();
        assert!(err.is_recoverable());
        assert!(factories.default.key(rule.as_ref()).is_ok());

        // No manifest yet: the engine executes and records one.
        let err = factories.dep_file.keys(rule.as_ref()).unwrap_err();
        assert!(matches!(err, RuleKeyError::MissingManifest { .. }));
    }
}
