//! aya-backed probe backend
//!
//! Loads the five `kprobe_skb_N` programs once, then attaches whichever one
//! matches the function's packet argument position.

use aya::programs::kprobe::KProbeLink;
use aya::programs::links::Link;
use aya::programs::{KProbe, ProgramError};
use aya::Ebpf;
use log::info;

use super::{ProbeBackend, ProbeLink};
use crate::domain::{AttachError, ProbeVariant, TracerError};

impl ProbeLink for KProbeLink {
    type Error = ProgramError;

    fn detach(self) -> Result<(), ProgramError> {
        Link::detach(self)
    }
}

/// Attaches the loaded kprobe programs of a probe object
pub struct KprobeBackend<'a> {
    bpf: &'a mut Ebpf,
}

impl<'a> KprobeBackend<'a> {
    /// Load all five probe programs into the kernel
    ///
    /// # Errors
    /// Returns [`TracerError::ProgramNotFound`] if the object lacks one of the
    /// programs, or the verifier error if loading fails.
    pub fn new(bpf: &'a mut Ebpf) -> Result<Self, TracerError> {
        for variant in ProbeVariant::ALL {
            let name = variant.program_name();
            let program: &mut KProbe =
                bpf.program_mut(name).ok_or(TracerError::ProgramNotFound(name))?.try_into()?;
            program.load()?;
        }
        info!("✓ Loaded {} probe programs", ProbeVariant::ALL.len());
        Ok(Self { bpf })
    }

    fn program(&mut self, variant: ProbeVariant) -> Result<&mut KProbe, ProgramError> {
        self.bpf
            .program_mut(variant.program_name())
            .ok_or(ProgramError::UnexpectedProgramType)?
            .try_into()
    }
}

impl ProbeBackend for KprobeBackend<'_> {
    type Link = KProbeLink;

    fn attach(&mut self, variant: ProbeVariant, function: &str) -> Result<KProbeLink, AttachError> {
        let program = self.program(variant).map_err(|e| AttachError::classify(function, e))?;
        let id = program.attach(function, 0).map_err(|e| AttachError::classify(function, e))?;
        program.take_link(id).map_err(|e| AttachError::classify(function, e))
    }
}
