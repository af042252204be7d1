use crate::{
    error::{Error, Result},
    network::{ReactionNetwork, SubdomainDiffusion},
    particle::{Particle, ParticleSystem, SystemParams},
    rdme::RdmeConfig,
    reaction::Reaction,
};
use derive_new::new;
use itertools::Itertools;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{digit0, digit1, multispace0, space1},
    combinator::{map_res, opt},
    multi::{separated_list0, separated_list1},
    number::complete::double,
    sequence::{delimited, preceded},
    AsChar, IResult, Parser,
};
use num_traits::Zero;
use rustc_hash::FxHashMap;
use std::{fs, path::Path};
use tinyvec::TinyVec;

/// The result of parsing a line defining a new reaction.
#[derive(Clone, Debug)]
struct NamedReaction {
    inputs: Vec<(String, u64)>,
    outputs: Vec<(String, u64)>,
    rate: f64,
}

/// The result of parsing a line setting the initial count of a species.
#[derive(Clone, Debug, new)]
struct InitialCount {
    name: String,
    amount: u64,
    /// The particle holding the molecules. If absent, every particle holds them.
    particle: Option<usize>,
}

/// The result of parsing a line adding a particle.
#[derive(Clone, Debug, new)]
struct ParticleLine {
    particle_type: usize,
    x: [f64; 3],
    mass_rho: Option<(f64, f64)>,
}

/// The result of parsing a line setting the diffusion rate of a species between subdomains.
#[derive(Clone, Debug, new)]
struct DiffusionLine {
    name: String,
    from: usize,
    to: usize,
    rate: f64,
}

/// An enum storing the result of parsing a line.
enum Line {
    Species(Vec<String>),
    Parameter(String, f64),
    Particle(ParticleLine),
    Count(InitialCount),
    Reaction(NamedReaction),
    Diffusion(DiffusionLine),
}

/// A particle system together with the chemistry to simulate on it.
#[derive(Clone, Debug)]
pub struct Model {
    pub system: ParticleSystem,
    pub config: RdmeConfig,
}

/// Accumulates the contents of model files.
#[derive(Default)]
pub struct ParseState {
    species: Vec<String>,
    parameters: FxHashMap<String, f64>,
    particles: Vec<ParticleLine>,
    counts: Vec<InitialCount>,
    reactions: Vec<NamedReaction>,
    diffusion: Vec<DiffusionLine>,
}

/// A parser for a nonnegative decimal number.
pub fn decimal(data: &str) -> IResult<&str, u64> {
    map_res(digit1, |s: &str| s.parse::<u64>()).parse(data)
}

fn index(data: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>()).parse(data)
}

fn name(data: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanum() || c == '_').parse(data)
}

/// Parses a separator surrounded by optional whitespace.
fn sep<'t>(separator: &'static str) -> impl Parser<&'t str, Output = &'t str, Error = nom::error::Error<&'t str>> {
    delimited(multispace0, tag(separator), multispace0)
}

/// Parses a line of the form:
/// ```ignore
/// species A B C
/// ```
fn parse_species(data: &str) -> IResult<&str, Line> {
    let (rem, (_, _, names)) =
        (tag("species"), space1, separated_list1(space1, name)).parse(data)?;
    Ok((
        rem,
        Line::Species(names.into_iter().map(str::to_owned).collect()),
    ))
}

/// Parses a line of the form:
/// ```ignore
/// set h = 0.5
/// ```
fn parse_parameter(data: &str) -> IResult<&str, Line> {
    let (rem, (_, _, key, _, value)) =
        (tag("set"), space1, name, sep("="), double).parse(data)?;
    Ok((rem, Line::Parameter(key.to_owned(), value)))
}

/// Parses a line of the form:
/// ```ignore
/// particle 1: 0.0 0.5 0.0, 1.0, 1.0
/// ```
/// that adds a particle of type 1 at the given position, with an optional mass and density.
fn parse_particle(data: &str) -> IResult<&str, Line> {
    let (rem, (_, _, particle_type, _, x, _, y, _, z, mass_rho)) = (
        tag("particle"),
        space1,
        index,
        sep(":"),
        double,
        space1,
        double,
        space1,
        double,
        opt((preceded(sep(","), double), preceded(sep(","), double))),
    )
        .parse(data)?;
    Ok((
        rem,
        Line::Particle(ParticleLine::new(particle_type, [x, y, z], mass_rho)),
    ))
}

/// Parses a line of the form:
/// ```ignore
/// A = 5 @ 2
/// ```
/// that sets the initial count of `A` on particle 2 to 5.
/// Without the `@ 2` suffix, every particle starts with 5 molecules of `A`.
fn parse_count(data: &str) -> IResult<&str, Line> {
    let (rem, (name, _, amount, particle)) =
        (name, sep("="), decimal, opt(preceded(sep("@"), index))).parse(data)?;

    Ok((
        rem,
        Line::Count(InitialCount::new(name.to_owned(), amount, particle)),
    ))
}

/// Parses a term of the form `2A`.
fn parse_reaction_item(data: &str) -> IResult<&str, (String, u64)> {
    let (rem, num): (&str, u64) = map_res(digit0, |s: &str| {
        if s.is_empty() {
            Ok(1)
        } else {
            s.parse::<u64>()
        }
    })
    .parse(data)?;
    let (rem, name) = name(rem)?;

    Ok((rem, (name.to_owned(), num)))
}

/// Parses one-half of a reaction:
/// ```ignore
/// 2A + B
/// ```
fn parse_reaction_half(data: &str) -> IResult<&str, Vec<(String, u64)>> {
    separated_list0(sep("+"), parse_reaction_item).parse(data)
}

/// A parser for a full reaction, of the form:
/// ```ignore
/// 2A + B -> 3C, 3.5e-9
/// ```
fn parse_reaction(reaction: &str) -> IResult<&str, Line> {
    let (rem, (left_half, _, right_half, _, rate)) = (
        parse_reaction_half,
        sep("->"),
        parse_reaction_half,
        sep(","),
        double,
    )
        .parse(reaction)?;

    let res = NamedReaction {
        inputs: left_half,
        outputs: right_half,
        rate,
    };

    Ok((rem, Line::Reaction(res)))
}

/// Parses a line of the form:
/// ```ignore
/// diffusion A: 0 -> 1, 0.25
/// ```
/// that sets the rate at which `A` diffuses from subdomain 0 to subdomain 1.
fn parse_diffusion(data: &str) -> IResult<&str, Line> {
    let (rem, (_, _, name, _, from, _, to, _, rate)) = (
        tag("diffusion"),
        space1,
        name,
        sep(":"),
        index,
        sep("->"),
        index,
        sep(","),
        double,
    )
        .parse(data)?;
    Ok((
        rem,
        Line::Diffusion(DiffusionLine::new(name.to_owned(), from, to, rate)),
    ))
}

fn parse_line(line: &str) -> IResult<&str, Line> {
    alt((
        parse_species,
        parse_parameter,
        parse_particle,
        parse_diffusion,
        parse_count,
        parse_reaction,
    ))
    .parse(line)
}

fn named_to_reaction(
    named_reaction: NamedReaction,
    species_names: &FxHashMap<&str, usize>,
) -> Result<Reaction> {
    let lookup = |name: &str| {
        species_names.get(name).copied().ok_or_else(|| {
            Error::InvalidNetwork(format!(
                "the reaction {named_reaction:?} refers to the undefined species {name:?}"
            ))
        })
    };

    let mut inputs: TinyVec<[(usize, u64); 4]> = TinyVec::default();
    for (comp, count) in &named_reaction.inputs {
        let comp = lookup(comp)?;
        match inputs.iter_mut().find(|(prev, _)| *prev == comp) {
            Some((_, prev_count)) => *prev_count += *count,
            None => inputs.push((comp, *count)),
        }
    }

    let outputs: Vec<(usize, i64)> = named_reaction
        .outputs
        .iter()
        .map(|(name, count)| Ok((lookup(name)?, *count as i64)))
        .collect::<Result<_>>()?;

    // Computing an iterator over the differences, and merging it to a single stoichiometry vector.
    let in_diff = inputs.iter().map(|(idx, count)| (*idx, -(*count as i64)));
    let all_diff = in_diff.chain(outputs).sorted();
    let mut stoichiometry: Vec<(usize, i64)> = Vec::new();
    for (idx, diff) in all_diff {
        match stoichiometry.last_mut() {
            Some((last, total)) if *last == idx => *total += diff,
            _ => stoichiometry.push((idx, diff)),
        }
    }
    let stoichiometry = stoichiometry.into_iter().filter(|(_, diff)| !diff.is_zero());

    Ok(Reaction::new(inputs, stoichiometry, named_reaction.rate))
}

impl ParseState {
    /// Parses a model file.
    pub fn parse_data_file(&mut self, path: &Path) -> Result<&mut Self> {
        let data = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        self.parse_str(&data)
    }

    /// Parses the contents of a model file.
    /// Every line either declares species, sets a parameter, adds a particle, sets an
    /// initial count, defines a reaction, or sets a diffusion rate:
    /// ```ignore
    /// species A B
    /// set h = 1.0
    /// particle 0: 0.0 0.0 0.0
    /// particle 0: 0.5 0.0 0.0
    /// A = 10 @ 0
    /// A -> B, 0.5
    /// diffusion A: 0 -> 0, 1.0
    /// ```
    pub fn parse_str(&mut self, data: &str) -> Result<&mut Self> {
        for (line_idx, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse_error = |message: String| Error::Parse {
                line: line_idx + 1,
                message,
            };
            let (rem, parsed) =
                parse_line(line).map_err(|err| parse_error(format!("{line:?}: {err}")))?;
            if !rem.trim().is_empty() {
                return Err(parse_error(format!("unexpected trailing input {rem:?}")));
            }
            match parsed {
                Line::Species(names) => {
                    for name in names {
                        self.declare(name);
                    }
                }
                Line::Parameter(key, value) => {
                    self.parameters.insert(key, value);
                }
                Line::Particle(particle) => self.particles.push(particle),
                Line::Count(count) => {
                    self.declare(count.name.clone());
                    self.counts.push(count);
                }
                Line::Reaction(reaction) => self.reactions.push(reaction),
                Line::Diffusion(diffusion) => self.diffusion.push(diffusion),
            }
        }
        Ok(self)
    }

    fn declare(&mut self, name: String) {
        if !self.species.contains(&name) {
            self.species.push(name);
        }
    }

    /// Builds the particle system and the chemistry described by the parsed files.
    pub fn get_model(self) -> Result<Model> {
        let species_idx: FxHashMap<&str, usize> = self
            .species
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();
        let lookup = |name: &str| {
            species_idx
                .get(name)
                .copied()
                .ok_or_else(|| Error::InvalidNetwork(format!("the species {name:?} is undefined")))
        };

        let reactions = self
            .reactions
            .iter()
            .cloned()
            .map(|reaction| named_to_reaction(reaction, &species_idx))
            .collect::<Result<Vec<_>>>()?;
        let network = ReactionNetwork::from_reactions(self.species.clone(), &reactions)?;

        let num_types = self
            .particles
            .iter()
            .map(|p| p.particle_type)
            .chain(self.diffusion.iter().flat_map(|d| [d.from, d.to]))
            .max()
            .map_or(1, |max| max + 1);
        let mut subdomain_diffusion =
            SubdomainDiffusion::new(self.species.len(), num_types, vec![0.; self.species.len() * num_types * num_types])?;
        for diffusion in &self.diffusion {
            subdomain_diffusion.set_rate(lookup(&diffusion.name)?, diffusion.from, diffusion.to, diffusion.rate);
        }

        let h = *self
            .parameters
            .get("h")
            .ok_or_else(|| Error::InvalidNetwork("the support radius `set h = ...` is missing".to_owned()))?;
        let flag = |key: &str| self.parameters.get(key).is_some_and(|value| *value != 0.);
        let params = SystemParams::builder()
            .h(h)
            .dimension(self.parameters.get("dimension").map_or(3, |d| *d as usize))
            .num_types(num_types)
            .num_species(self.species.len())
            .num_reactions(reactions.len())
            .static_domain(flag("static_domain"))
            .build();

        let mut system = ParticleSystem::new(params);
        for (id, line) in self.particles.iter().enumerate() {
            let (mass, rho) = line.mass_rho.unwrap_or((1., 1.));
            system.add_particle(
                Particle::builder()
                    .id(id)
                    .x(line.x)
                    .mass(mass)
                    .rho(rho)
                    .particle_type(line.particle_type)
                    .build(),
            )?;
        }

        let species = self.species.len();
        let mut u0 = vec![0; system.len() * species];
        for count in &self.counts {
            let s = lookup(&count.name)?;
            match count.particle {
                Some(particle) if particle >= system.len() => {
                    return Err(Error::InvalidNetwork(format!(
                        "the initial count of {} refers to the undefined particle {particle}",
                        count.name
                    )))
                }
                Some(particle) => u0[particle * species + s] = count.amount as i64,
                None => u0
                    .iter_mut()
                    .skip(s)
                    .step_by(species)
                    .for_each(|c| *c = count.amount as i64),
            }
        }

        let config = RdmeConfig::builder()
            .network(network)
            .subdomain_diffusion(subdomain_diffusion)
            .u0(u0)
            .build();
        Ok(Model { system, config })
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::particle::ParticleIdx;

    const MODEL: &str = "
# Two subdomains exchanging A.
species A B
set h = 1.0
set static_domain = 1
particle 0: 0.0 0.0 0.0
particle 1: 0.5 0.0 0.0, 2.0, 1.5
A = 3
B = 7 @ 1
2A + B -> 3B, 0.25
-> A, 1e-3
diffusion A: 0 -> 1, 0.5
diffusion A: 1 -> 0, 0.5
";

    #[test]
    fn parses_items() {
        let Line::Reaction(reaction) = parse_line("2A + B -> 3C, 3.5e-9").unwrap().1 else {
            panic!("expected a reaction");
        };
        assert_eq!(reaction.inputs, vec![("A".to_owned(), 2), ("B".to_owned(), 1)]);
        assert_eq!(reaction.outputs, vec![("C".to_owned(), 3)]);
        assert_eq!(reaction.rate, 3.5e-9);

        let Line::Particle(particle) = parse_line("particle 2: 1 -0.5 2e-1").unwrap().1 else {
            panic!("expected a particle");
        };
        assert_eq!(particle.particle_type, 2);
        assert_eq!(particle.x, [1., -0.5, 0.2]);
        assert_eq!(particle.mass_rho, None);

        let Line::Count(count) = parse_line("A = 5 @ 3").unwrap().1 else {
            panic!("expected a count");
        };
        assert_eq!((count.amount, count.particle), (5, Some(3)));

        let Line::Diffusion(diffusion) = parse_line("diffusion X: 1 -> 0, 0.1").unwrap().1 else {
            panic!("expected a diffusion rate");
        };
        assert_eq!((diffusion.name.as_str(), diffusion.from, diffusion.to), ("X", 1, 0));
    }

    #[test]
    fn builds_model() {
        let mut state = ParseState::default();
        state.parse_str(MODEL).unwrap();
        let model = state.get_model().unwrap();

        let system = &model.system;
        assert_eq!(system.len(), 2);
        assert_eq!(system.params.h, 1.);
        assert_eq!(system.params.num_types, 2);
        assert!(system.params.static_domain);
        let second = &system.particles[ParticleIdx::new(1)];
        assert_eq!((second.mass, second.rho, second.particle_type), (2., 1.5, 1));

        let network = &model.config.network;
        assert_eq!(network.species_names(), &["A".to_owned(), "B".to_owned()]);
        assert_eq!(network.stoichiometry(0).collect_vec(), vec![(0, -2), (1, 2)]);
        assert_eq!(network.stoichiometry(1).collect_vec(), vec![(0, 1)]);
        assert_eq!(network.propensity(0).inputs.as_slice(), &[(0, 2), (1, 1)]);

        assert_eq!(model.config.u0, Some(vec![3, 0, 3, 7]));
        assert_eq!(model.config.subdomain_diffusion.rate(0, 0, 1), 0.5);
        assert_eq!(model.config.subdomain_diffusion.rate(1, 0, 1), 0.);
    }

    #[test]
    fn reports_bad_lines() {
        let mut state = ParseState::default();
        let err = state.parse_str("species A\nA => B, 1.0\n").err().unwrap();
        assert!(matches!(err, Error::Parse { line: 2, .. }));

        let mut state = ParseState::default();
        let err = state.parse_str("set h = 1.0 extra").err().unwrap();
        assert!(matches!(err, Error::Parse { line: 1, .. }));

        let mut state = ParseState::default();
        state.parse_str("set h = 1.0\nA -> C, 1.0\nA = 1").unwrap();
        assert!(matches!(state.get_model(), Err(Error::InvalidNetwork(_))));

        let mut state = ParseState::default();
        state.parse_str("A = 1").unwrap();
        assert!(state.get_model().is_err());
    }
}
