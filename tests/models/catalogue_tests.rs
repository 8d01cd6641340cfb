//! Catalogue-wide properties

use std::collections::BTreeSet;

use relaxfit::error::RelaxError;
use relaxfit::{Equation, EquationModel};

#[test]
fn test_make_map_is_distinct_for_every_variant() {
    for equation in Equation::ALL {
        let model = equation.model();
        let m = model.par_names().len();
        for n in [1, 2, 5] {
            let map = model.make_map(n);
            let all: Vec<usize> = map.iter().flatten().copied().collect();
            let distinct: BTreeSet<usize> = all.iter().copied().collect();
            assert_eq!(all.len(), n * m, "{}", equation);
            assert_eq!(distinct, (0..n * m).collect(), "{}", equation);
        }
    }
}

#[test]
fn test_shared_map_shares_exactly_the_group_slots() {
    for equation in Equation::ALL {
        let model = equation.model();
        let map = model.make_shared_map(3);
        let g = model.n_group_pars();
        let m = model.par_names().len();
        assert_eq!(map.n_pars(), g + 3 * (m - g), "{}", equation);
        for id in 1..3 {
            assert_eq!(&map.curve(id)[..g], &map.curve(0)[..g]);
        }
    }
}

#[test]
fn test_kex_rules() {
    let pars = [321.0, 0.1, 12.0, 1.0, 1.0, 1.0, 10.0, 20.0];
    for equation in Equation::ALL {
        let kex = equation.model().kex(&pars);
        match equation {
            Equation::NoEx | Equation::ExpAb | Equation::ExpAbc => assert_eq!(kex, 0.0, "{}", equation),
            _ => assert_eq!(kex, 321.0, "{}", equation),
        }
    }
}

#[test]
fn test_names_resolve() {
    for equation in Equation::ALL {
        assert_eq!(Equation::from_name(equation.name()).unwrap(), equation);
        assert_eq!(equation.to_string().parse::<Equation>().unwrap(), equation);
    }
    assert_eq!(Equation::from_name("cpmgfast").unwrap(), Equation::CpmgFast);
    assert!(matches!(
        Equation::from_name("CPMGEXACT"),
        Err(RelaxError::UnknownEquation(_))
    ));
}

#[test]
fn test_serialized_names_match_catalogue() {
    for equation in Equation::ALL {
        let json = serde_json::to_string(&equation).unwrap();
        assert_eq!(json, format!("\"{}\"", equation.name()));
    }
}
