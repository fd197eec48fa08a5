//! Built-in suggested builders and stacks
//!
//! Suggested builders are always trusted. They are never written to the
//! config file and cannot be untrusted.

/// A builder kiln recommends and trusts by default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestedBuilder {
    pub vendor: &'static str,
    pub image: &'static str,
    pub description: &'static str,
}

/// A stack kiln recommends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestedStack {
    pub id: &'static str,
    pub description: &'static str,
    pub maintainer: &'static str,
    pub build_image: &'static str,
    pub run_image: &'static str,
}

pub const SUGGESTED_BUILDERS: &[SuggestedBuilder] = &[
    SuggestedBuilder {
        vendor: "Google",
        image: "gcr.io/buildpacks/builder:v1",
        description: "GCP Builder for all runtimes",
    },
    SuggestedBuilder {
        vendor: "Heroku",
        image: "heroku/buildpacks:18",
        description: "heroku-18 base image with buildpacks for Ruby, Java, Node.js, Python, Golang, & PHP",
    },
    SuggestedBuilder {
        vendor: "Heroku",
        image: "heroku/buildpacks:20",
        description: "heroku-20 base image with buildpacks for Ruby, Java, Node.js, Python, Golang, & PHP",
    },
    SuggestedBuilder {
        vendor: "Paketo Buildpacks",
        image: "paketobuildpacks/builder:base",
        description: "Small base image with buildpacks for Java, Node.js, Golang, & .NET Core",
    },
    SuggestedBuilder {
        vendor: "Paketo Buildpacks",
        image: "paketobuildpacks/builder:full",
        description: "Larger base image with buildpacks for Java, Node.js, Golang, .NET Core, & PHP",
    },
    SuggestedBuilder {
        vendor: "Paketo Buildpacks",
        image: "paketobuildpacks/builder:tiny",
        description: "Tiny base image (bionic build image, distroless run image) with buildpacks for Golang",
    },
];

pub const SUGGESTED_STACKS: &[SuggestedStack] = &[
    SuggestedStack {
        id: "heroku-18",
        description: "The official Heroku stack based on Ubuntu 18.04",
        maintainer: "Heroku",
        build_image: "heroku/pack:18-build",
        run_image: "heroku/pack:18",
    },
    SuggestedStack {
        id: "heroku-20",
        description: "The official Heroku stack based on Ubuntu 20.04",
        maintainer: "Heroku",
        build_image: "heroku/pack:20-build",
        run_image: "heroku/pack:20",
    },
    SuggestedStack {
        id: "io.buildpacks.stacks.bionic",
        description: "A minimal Paketo stack based on Ubuntu 18.04",
        maintainer: "Paketo Project",
        build_image: "paketobuildpacks/build:base-cnb",
        run_image: "paketobuildpacks/run:base-cnb",
    },
    SuggestedStack {
        id: "io.paketo.stacks.tiny",
        description: "A tiny Paketo stack based on Ubuntu 18.04, similar to distroless",
        maintainer: "Paketo Project",
        build_image: "paketobuildpacks/build:tiny-cnb",
        run_image: "paketobuildpacks/run:tiny-cnb",
    },
];

/// Whether `name` is one of the built-in suggested builders
pub fn is_suggested(name: &str) -> bool {
    SUGGESTED_BUILDERS.iter().any(|b| b.image == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_lookup() {
        assert!(is_suggested("paketobuildpacks/builder:base"));
        assert!(!is_suggested("paketobuildpacks/builder"));
    }

    #[test]
    fn suggested_builders_are_unique() {
        let mut images: Vec<_> = SUGGESTED_BUILDERS.iter().map(|b| b.image).collect();
        images.sort();
        images.dedup();
        assert_eq!(images.len(), SUGGESTED_BUILDERS.len());
    }
}
